//! Metadata store error types.

use thiserror::Error;

/// Format part numbers for display, capping at MAX_DISPLAYED to prevent log bloat.
fn format_part_numbers(parts: &[u32]) -> String {
    const MAX_DISPLAYED: usize = 5;
    if parts.len() <= MAX_DISPLAYED {
        format!("{:?}", parts)
    } else {
        let sample: Vec<_> = parts.iter().take(MAX_DISPLAYED).collect();
        format!("{:?} (and {} more)", sample, parts.len() - MAX_DISPLAYED)
    }
}

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid part: {0}")]
    InvalidPart(#[from] vaultlift_core::Error),

    #[error("ledger for {transfer} has gaps at parts {}", format_part_numbers(.missing))]
    LedgerGaps { transfer: String, missing: Vec<u32> },
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for MetadataError {
    fn from(e: serde_json::Error) -> Self {
        MetadataError::Serialization(e.to_string())
    }
}
