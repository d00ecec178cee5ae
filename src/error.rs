use thiserror::Error;

use crate::upload::UploadKind;

/// Failure reported by an object store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage reference '{0}'")]
    InvalidReference(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Failure of a submission pipeline run.
///
/// Nothing is persisted in the database for any of these.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} upload {position} has invalid content encoding: {source}")]
    InvalidContent {
        kind: UploadKind,
        position: usize,
        #[source]
        source: base64::DecodeError,
    },

    #[error("{kind} upload {position} failed: {source}")]
    Upload {
        kind: UploadKind,
        position: usize,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("detail value json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl SubmissionError {
    pub fn validation(message: impl Into<String>) -> Self {
        SubmissionError::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SubmissionError::Validation(_))
    }
}

pub type Result<T, E = SubmissionError> = std::result::Result<T, E>;
