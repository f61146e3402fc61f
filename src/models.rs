//! Core data models.
//!
//! These types represent the document, chunks, and stage results that flow
//! through the build-then-answer workflow.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::FaqError;
use crate::index::VectorIndex;

/// One page (PDF) or form-feed-delimited section (text) of the source.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based.
    pub number: usize,
    pub text: String,
}

/// The loaded source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub content_type: String,
    pub pages: Vec<Page>,
}

/// Metadata attached to every chunk at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub language: String,
    pub chunk_type: String,
    pub page: usize,
}

/// A bounded span of page text, the unit of retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: String,
    /// Position across the whole document, contiguous from 0.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    /// Character offsets of `text` within its page.
    pub start_char: usize,
    pub end_char: usize,
    /// True when no separator fit inside the size limit and the chunk was
    /// cut at exactly `chunk_size` characters.
    pub hard_cut: bool,
    pub metadata: ChunkMetadata,
}

/// Output of the index-build stage.
#[derive(Debug)]
pub enum IndexOutcome {
    Ready(VectorIndex),
    Failed(FaqError),
}

impl IndexOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, IndexOutcome::Ready(_))
    }
}

/// Output of the answer-generation stage.
#[derive(Debug)]
pub enum AnswerOutcome {
    Answered(String),
    Failed(FaqError),
}

/// Workflow trigger payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Trigger {
    pub question: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Structured result returned to every caller.
///
/// Serializes as `{"status":"success","answer":"…"}` or
/// `{"status":"error","error":"…"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn success(answer: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            answer: Some(answer.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            answer: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

impl From<AnswerOutcome> for WorkflowResult {
    fn from(outcome: AnswerOutcome) -> Self {
        match outcome {
            AnswerOutcome::Answered(text) => WorkflowResult::success(text),
            AnswerOutcome::Failed(err) => WorkflowResult::error(err.to_string()),
        }
    }
}
