use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`Retriever::retrieve`](super::Retriever::retrieve).
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Malformed request. Rejected before any I/O; retrying will not help.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No owner scope was supplied. Unscoped reads are never served.
    #[error("an owner_id is required to scope retrieval")]
    ScopeRequired,

    /// Query embedding failed after retry, or both indexes failed.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),
}

/// Failure of a single index adapter call.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index storage error: {0}")]
    Storage(String),

    #[error("index task failed: {0}")]
    TaskFailed(String),

    #[error("index search timed out after {0:?}")]
    Timeout(Duration),
}

impl From<rusqlite::Error> for IndexError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
