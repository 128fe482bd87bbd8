//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid chunk size: {size} (must be a power of two)")]
    InvalidChunkSize { size: u64 },

    #[error(
        "chunk size {chunk_size} must be larger than the maximum inventory record size {max_record_size}"
    )]
    ChunkTooSmall {
        chunk_size: u64,
        max_record_size: u64,
    },

    #[error("invalid byte range: {0}")]
    InvalidByteRange(String),

    #[error("invalid part: {0}")]
    InvalidPart(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("composite checksum is missing positions {missing:?}")]
    IncompleteComposite { missing: Vec<usize> },

    #[error("no record boundary within the first {window} bytes of the chunk")]
    NoRecordBoundary { window: usize },

    #[error("invalid job notification: {0}")]
    InvalidNotification(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
