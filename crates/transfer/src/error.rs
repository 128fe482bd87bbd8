//! Transfer error types.

use vaultlift_metadata::MetadataError;
use vaultlift_storage::StorageError;

/// Errors surfaced by the transfer orchestrators.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("checksum mismatch: vault reported {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("job {job_id} is not registered")]
    UnknownJob { job_id: String },

    #[error("workflow signal failed: {0}")]
    Signal(String),

    #[error("upload worker pool stopped: {0}")]
    WorkerPool(String),

    #[error("upload worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("core error: {0}")]
    Core(#[from] vaultlift_core::Error),
}

/// Result type for transfer operations.
pub type TransferResult<T> = std::result::Result<T, TransferError>;

impl TransferError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::UnknownJob { .. } => "unknown_job",
            Self::Signal(_) => "signal_error",
            Self::WorkerPool(_) => "worker_pool_error",
            Self::Join(_) => "worker_panicked",
            Self::Storage(StorageError::AccessViolation { .. }) => "access_violation",
            Self::Storage(StorageError::AlreadyCompleted { .. }) => "already_completed",
            Self::Storage(StorageError::UnresumableUpload { .. }) => "unresumable_upload",
            Self::Storage(StorageError::IncompleteUpload { .. }) => "incomplete_upload",
            Self::Storage(StorageError::Upstream(_)) => "upstream_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(vaultlift_core::Error::InvalidChunkSize { .. }) => "invalid_chunk_size",
            Self::Core(vaultlift_core::Error::ChunkTooSmall { .. }) => "chunk_too_small",
            Self::Core(_) => "core_error",
        }
    }
}
