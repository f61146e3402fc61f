//! Source document loading.
//!
//! Turns the configured file into an ordered list of [`Page`]s. PDFs are
//! extracted page by page with `pdf-extract`; plain text and Markdown are
//! read as UTF-8 and split on form feeds (`\x0c`), the conventional page
//! break in text dumps of paginated documents.
//!
//! Extraction never panics; failures come back as [`LoadError`] and the
//! index builder reports them as an indexing failure.

use std::path::Path;
use thiserror::Error;

use crate::models::{Page, SourceDocument};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

const PAGE_BREAK: char = '\x0c';

/// Why the document could not be turned into pages.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported document type: {0}")]
    UnsupportedContentType(String),
    #[error("failed to read document: {0}")]
    Io(#[source] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("document is not valid UTF-8: {0}")]
    Utf8(String),
}

/// Map a file extension to the content type the loader understands.
pub fn content_type_for(path: &Path) -> Result<&'static str, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok(MIME_PDF),
        "txt" => Ok(MIME_TEXT),
        "md" | "markdown" => Ok(MIME_MARKDOWN),
        _ => Err(LoadError::UnsupportedContentType(format!(
            "'.{}' ({})",
            ext,
            path.display()
        ))),
    }
}

/// Read and split the document at `path`.
///
/// PDF extraction is CPU-bound and runs on the blocking pool.
pub async fn load_document(path: &Path) -> Result<SourceDocument, LoadError> {
    let content_type = content_type_for(path)?;
    let bytes = tokio::fs::read(path).await.map_err(LoadError::Io)?;

    let pages = if content_type == MIME_PDF {
        tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes))
            .await
            .map_err(|e| LoadError::Pdf(e.to_string()))??
    } else {
        split_text_pages(&bytes)?
    };

    Ok(SourceDocument {
        path: path.to_path_buf(),
        content_type: content_type.to_string(),
        pages,
    })
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<Page>, LoadError> {
    let texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| LoadError::Pdf(e.to_string()))?;
    Ok(number_pages(texts))
}

fn split_text_pages(bytes: &[u8]) -> Result<Vec<Page>, LoadError> {
    let text = std::str::from_utf8(bytes).map_err(|e| LoadError::Utf8(e.to_string()))?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(number_pages(text.split(PAGE_BREAK).map(str::to_string)))
}

fn number_pages(texts: impl IntoIterator<Item = String>) -> Vec<Page> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page { number: i + 1, text })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for(Path::new("a/Plan.PDF")).unwrap(), MIME_PDF);
        assert_eq!(content_type_for(Path::new("plan.txt")).unwrap(), MIME_TEXT);
        assert_eq!(content_type_for(Path::new("plan.md")).unwrap(), MIME_MARKDOWN);
        let err = content_type_for(Path::new("plan.docx")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedContentType(_)));
    }

    #[test]
    fn form_feed_splits_pages() {
        let pages = split_text_pages("第一页\x0c第二页\x0c".as_bytes()).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[0].text, "第一页");
        assert_eq!(pages[1].text, "第二页");
        assert_eq!(pages[2].text, "");
    }

    #[test]
    fn empty_text_has_no_pages() {
        assert!(split_text_pages(b"").unwrap().is_empty());
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let err = split_text_pages(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, LoadError::Utf8(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf_pages(b"not a pdf").unwrap_err();
        assert!(matches!(err, LoadError::Pdf(_)));
    }

    #[test]
    fn errors_describe_the_failure() {
        let err = content_type_for(Path::new("plan.docx")).unwrap_err();
        assert_eq!(err.to_string(), "unsupported document type: '.docx' (plan.docx)");
        assert_eq!(
            LoadError::Pdf("bad xref".into()).to_string(),
            "PDF extraction failed: bad xref"
        );
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = load_document(Path::new("/nonexistent/policy.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }
}
