//! Typed failures for the two workflow stages.
//!
//! Each stage converts whatever goes wrong locally into one of these
//! variants; nothing crosses a stage boundary as a panic or an untyped
//! error. The `Display` text is what callers see in the `error` field of a
//! [`WorkflowResult`](crate::models::WorkflowResult).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaqError {
    #[error("document not found at path: {}", .0.display())]
    ResourceNotFound(PathBuf),

    #[error("indexing failed: {0}")]
    IndexingFailure(String),

    #[error("retrieval failed: {0}")]
    RetrievalFailure(String),

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("upstream dependency failed: {0}")]
    UpstreamDependencyFailure(String),

    /// The generator was handed a failed build. Carries the build's message.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("invalid question: {0}")]
    InvalidQuestion(String),
}

impl FaqError {
    /// Machine-readable code used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            FaqError::ResourceNotFound(_) => "resource_not_found",
            FaqError::IndexingFailure(_) => "indexing_failure",
            FaqError::RetrievalFailure(_) => "retrieval_failure",
            FaqError::GenerationFailure(_) => "generation_failure",
            FaqError::UpstreamDependencyFailure(_) => "upstream_failure",
            FaqError::IndexUnavailable(_) => "index_unavailable",
            FaqError::InvalidQuestion(_) => "bad_request",
        }
    }
}

/// Map a collaborator error onto the taxonomy: transport failures become
/// [`FaqError::UpstreamDependencyFailure`], everything else takes the
/// stage's own variant.
pub fn classify(err: anyhow::Error, stage: fn(String) -> FaqError) -> FaqError {
    let message = format!("{:#}", err);
    if err.downcast_ref::<reqwest::Error>().is_some() {
        FaqError::UpstreamDependencyFailure(message)
    } else {
        stage(message)
    }
}

impl From<reqwest::Error> for FaqError {
    fn from(err: reqwest::Error) -> Self {
        FaqError::UpstreamDependencyFailure(err.to_string())
    }
}
