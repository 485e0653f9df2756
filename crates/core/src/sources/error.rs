//! Error type shared by every adapter.

use thiserror::Error;

use crate::extractor::ExtractorError;
use crate::resolver::gather::Cancelled;
use crate::resolver::ResolveError;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The upstream has no such item.
    #[error("not found: {0}")]
    NotFound(String),

    /// The id does not have the shape this source produces.
    #[error("malformed id: {0}")]
    BadId(String),

    #[error("upstream fetch failed: {stage}")]
    Fetch { stage: String },

    #[error("failed to parse {what}")]
    Parse { what: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Tool(#[from] ExtractorError),

    #[error("request cancelled")]
    Cancelled,
}

impl SourceError {
    pub fn fetch(stage: impl Into<String>) -> Self {
        Self::Fetch {
            stage: stage.into(),
        }
    }

    pub fn parse(what: impl Into<String>) -> Self {
        Self::Parse { what: what.into() }
    }

    pub fn bad_id(id: &str) -> Self {
        Self::BadId(id.to_string())
    }
}

impl From<Cancelled> for SourceError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
