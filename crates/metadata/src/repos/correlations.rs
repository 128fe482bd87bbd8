//! Correlation record repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use std::time::Duration;
use time::OffsetDateTime;
use vaultlift_core::{CorrelationRecord, JobResult};

/// Result of merging a completion into a correlation record.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// This call moved the record to terminal. Carries the stored record.
    Applied(CorrelationRecord),
    /// The record was already terminal; nothing was written.
    AlreadyTerminal(CorrelationRecord),
}

impl CompletionOutcome {
    pub fn record(&self) -> &CorrelationRecord {
        match self {
            Self::Applied(record) | Self::AlreadyTerminal(record) => record,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Repository for correlation records keyed by vault job id.
#[async_trait]
pub trait CorrelationRepo: Send + Sync {
    /// Insert an in-progress record. Fails with `AlreadyExists` if the job is
    /// already registered.
    async fn register_job(&self, record: &CorrelationRecord) -> MetadataResult<()>;

    /// Get a record by job id.
    async fn get_job(&self, job_id: &str) -> MetadataResult<Option<CorrelationRecord>>;

    /// Conditionally write the job result and finish timestamp.
    ///
    /// The write only applies while `finish_timestamp` is unset, so of two
    /// concurrent deliveries exactly one observes `Applied`. Fails with
    /// `NotFound` if the job was never registered.
    async fn complete_job(
        &self,
        job_id: &str,
        result: &JobResult,
        finished_at: OffsetDateTime,
    ) -> MetadataResult<CompletionOutcome>;

    /// Take the right to signal the workflow for a terminal record.
    ///
    /// Succeeds only while the record is terminal, not yet signalled, and not
    /// claimed by another delivery within `lease`. A claim older than `lease`
    /// is treated as abandoned. Fails with `NotFound` if the job was never
    /// registered.
    async fn claim_signal(
        &self,
        job_id: &str,
        now: OffsetDateTime,
        lease: Duration,
    ) -> MetadataResult<bool>;

    /// Record that the workflow accepted the signal.
    async fn mark_signalled(&self, job_id: &str, at: OffsetDateTime) -> MetadataResult<()>;

    /// Drop an unfulfilled claim so the next delivery can signal.
    async fn release_signal(&self, job_id: &str) -> MetadataResult<()>;

    /// Records still waiting on their job, oldest first.
    async fn list_in_progress(&self, limit: u32) -> MetadataResult<Vec<CorrelationRecord>>;
}
