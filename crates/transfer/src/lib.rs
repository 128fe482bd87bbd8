//! Orchestration of vault-to-object-store transfers.
//!
//! This crate provides:
//! - [`TransferFacilitator`]: verified single-range transfers and whole-object
//!   streaming with bounded upload concurrency
//! - [`AsyncJobCorrelator`]: vault job completion to workflow signalling
//! - Queue message types and ledger-driven upload completion
//! - Metrics and tracing setup

pub mod correlator;
pub mod error;
pub mod facilitator;
pub mod metrics;
pub mod signal;
pub mod tasks;
pub mod telemetry;

pub use correlator::{AsyncJobCorrelator, CorrelationOutcome};
pub use error::{TransferError, TransferResult};
pub use facilitator::{JobRange, PartTarget, TransferFacilitator, TransferOptions};
pub use signal::{SfnSignaler, WorkflowSignaler};
pub use tasks::{
    ArchiveChunkRequest, InventoryChunkRequest, InventoryPartTask, RetrievalTask,
    complete_from_ledger,
};

use std::sync::Arc;
use vaultlift_core::config::AppConfig;

/// Build a facilitator from configuration.
pub async fn facilitator_from_config(config: &AppConfig) -> TransferResult<TransferFacilitator> {
    let (vault, multipart) = vaultlift_storage::from_config(&config.storage).await?;
    Ok(TransferFacilitator::new(
        vault,
        multipart,
        TransferOptions::from(&config.transfer),
    ))
}

/// Build a correlator backed by the configured store and Step Functions.
pub async fn correlator_from_config(config: &AppConfig) -> TransferResult<AsyncJobCorrelator> {
    let store = vaultlift_metadata::from_config(&config.metadata).await?;
    let signaler = Arc::new(SfnSignaler::new(&config.workflow));
    Ok(AsyncJobCorrelator::new(store, signaler))
}
