//! Index-build stage.
//!
//! Document → pages → chunks → vectors → [`VectorIndex`]. Every failure is
//! caught here and reported as [`IndexOutcome::Failed`].

use crate::config::Config;
use crate::embedding::{embed_all, Embedder};
use crate::error::{classify, FaqError};
use crate::index::VectorIndex;
use crate::loader::load_document;
use crate::models::{Chunk, IndexOutcome};

/// Build the in-memory index for the configured document.
pub async fn build_index(config: &Config, embedder: &dyn Embedder) -> IndexOutcome {
    match try_build_index(config, embedder).await {
        Ok(index) => {
            tracing::info!(
                chunks = index.len(),
                model = index.model(),
                dims = index.dims(),
                "index ready"
            );
            IndexOutcome::Ready(index)
        }
        Err(err) => {
            tracing::error!(error = %err, "error preparing vector index");
            IndexOutcome::Failed(err)
        }
    }
}

async fn try_build_index(config: &Config, embedder: &dyn Embedder) -> Result<VectorIndex, FaqError> {
    let chunks = chunk_document(config).await?;

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = if texts.is_empty() {
        Vec::new()
    } else {
        embed_all(embedder, &texts, config.embedding.batch_size)
            .await
            .map_err(|e| classify(e.context("embedding chunks"), FaqError::IndexingFailure))?
    };

    VectorIndex::new(embedder.model_name(), embedder.dims(), chunks, vectors)
        .map_err(|e| FaqError::IndexingFailure(e.to_string()))
}

/// Load and split the configured document without embedding it.
///
/// A missing file is [`FaqError::ResourceNotFound`]; an unreadable one is
/// [`FaqError::IndexingFailure`]. An empty document yields no chunks.
pub async fn chunk_document(config: &Config) -> Result<Vec<Chunk>, FaqError> {
    let path = &config.document.path;
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(FaqError::ResourceNotFound(path.clone()));
    }

    let document = load_document(path)
        .await
        .map_err(|e| FaqError::IndexingFailure(e.to_string()))?;

    let chunks = crate::chunk::chunk_pages(&document.pages, &config.chunking, &config.metadata);

    let hard_cuts = chunks.iter().filter(|c| c.hard_cut).count();
    tracing::info!(
        path = %path.display(),
        content_type = %document.content_type,
        pages = document.pages.len(),
        chunks = chunks.len(),
        hard_cuts,
        "document split"
    );

    Ok(chunks)
}
