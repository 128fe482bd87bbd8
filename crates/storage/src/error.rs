//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Opaque transport or service failure. Not retried here.
    #[error("upstream error: {0}")]
    Upstream(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("job output for {job_id} was already read")]
    AccessViolation { job_id: String },

    #[error("multipart upload {upload_id} is already completed")]
    AlreadyCompleted { upload_id: String },

    #[error(
        "cannot resume upload: upload_id and next_part_number must be given together (upload_id: {has_upload_id}, next_part_number: {has_part_number})"
    )]
    UnresumableUpload {
        has_upload_id: bool,
        has_part_number: bool,
    },

    #[error("multipart upload {upload_id} is missing parts {missing:?}")]
    IncompleteUpload {
        upload_id: String,
        missing: Vec<u32>,
    },

    #[error("invalid part: {0}")]
    InvalidPart(String),

    #[error(transparent)]
    Core(#[from] vaultlift_core::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
