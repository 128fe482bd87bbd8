//! Persisted control-plane state for vault transfers.
//!
//! This crate provides:
//! - Correlation records linking vault jobs to waiting workflows
//! - The part ledger shared by workers uploading parts of one object

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::TransferKey;
pub use repos::{CompletionOutcome, CorrelationRepo, PartRepo};
pub use store::{MetadataStore, SqliteStore};

use std::sync::Arc;
use vaultlift_core::config::MetadataConfig;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::new(&config.path).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}
