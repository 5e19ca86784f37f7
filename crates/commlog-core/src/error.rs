//! Error types for commlog.

use commlog_types::RecordKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommlogError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] rusqlite::Error),

    #[error("Malformed {kind} record {id}: {reason}")]
    MalformedRecord {
        kind: RecordKind,
        id: String,
        reason: String,
    },

    #[error("Sync already in progress for {0}")]
    SyncInProgress(RecordKind),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Background task failed: {0}")]
    TaskJoin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommlogError {
    /// Whether the caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommlogError::SourceUnavailable(_) | CommlogError::StorageFailure(_)
        )
    }
}

impl From<notify::Error> for CommlogError {
    fn from(e: notify::Error) -> Self {
        CommlogError::Watch(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CommlogError {
    fn from(e: tokio::task::JoinError) -> Self {
        CommlogError::TaskJoin(e.to_string())
    }
}
