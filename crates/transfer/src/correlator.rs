//! Bridging vault job completion to the workflow waiting on it.
//!
//! A job is registered with the workflow's task token when it is requested.
//! Completion arrives either as a push notification carrying the job
//! description, or as an update of the stored record itself. Both paths end
//! in the same signal to the workflow.
//!
//! A delivery signals only after claiming the record, and the record is marked
//! signalled only once the workflow accepted the signal. A failed signal gives
//! the claim back, so a redelivery of the same completion retries it.

use crate::error::{TransferError, TransferResult};
use crate::metrics;
use crate::signal::{WorkflowSignaler, deliver};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, instrument};
use vaultlift_core::{CompletionSignal, CorrelationRecord, JobNotification};
use vaultlift_metadata::{CompletionOutcome, MetadataError, MetadataStore};

/// How long a claim blocks other deliveries before it counts as abandoned.
const SIGNAL_LEASE: Duration = Duration::from_secs(300);

/// What handling one completion event did.
#[derive(Clone, Debug, PartialEq)]
pub enum CorrelationOutcome {
    /// The job is still running. Nothing was written or sent.
    InProgress,
    /// The workflow was told the job succeeded or failed.
    Signalled { success: bool },
    /// The record is terminal but carries no task token to signal.
    NoTaskToken,
    /// The workflow was already signalled, or another delivery is signalling
    /// it. Nothing was sent.
    Duplicate,
}

impl CorrelationOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Signalled { success: true } => "signalled_success",
            Self::Signalled { success: false } => "signalled_failure",
            Self::NoTaskToken => "no_task_token",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Per-job state machine over persisted correlation records.
pub struct AsyncJobCorrelator {
    store: Arc<dyn MetadataStore>,
    signaler: Arc<dyn WorkflowSignaler>,
}

impl AsyncJobCorrelator {
    pub fn new(store: Arc<dyn MetadataStore>, signaler: Arc<dyn WorkflowSignaler>) -> Self {
        Self { store, signaler }
    }

    /// Record that `job_id` was requested and a workflow waits on it.
    #[instrument(skip(self, task_token))]
    pub async fn register(
        &self,
        job_id: &str,
        task_token: Option<String>,
        started_at: OffsetDateTime,
    ) -> TransferResult<CorrelationRecord> {
        let record = CorrelationRecord::new(job_id, task_token, started_at);
        self.store.register_job(&record).await?;
        info!("registered job");
        Ok(record)
    }

    /// Handle a raw push message delivered at `timestamp`.
    pub async fn on_message(
        &self,
        message: &str,
        timestamp: OffsetDateTime,
    ) -> TransferResult<CorrelationOutcome> {
        let notification = JobNotification::parse(message, timestamp)?;
        self.on_notification(&notification).await
    }

    /// Handle a push notification.
    ///
    /// In-progress notifications are ignored. Otherwise the completion is
    /// merged into the record with a conditional write, which keeps the first
    /// result. The stored result is then signalled unless the workflow
    /// already has it.
    #[instrument(skip(self, notification), fields(job_id = %notification.result.job_id, status = notification.result.status_code.as_str()))]
    pub async fn on_notification(
        &self,
        notification: &JobNotification,
    ) -> TransferResult<CorrelationOutcome> {
        let outcome = self.handle_notification(notification).await;
        record_outcome(&outcome);
        outcome
    }

    async fn handle_notification(
        &self,
        notification: &JobNotification,
    ) -> TransferResult<CorrelationOutcome> {
        let result = &notification.result;
        if !result.status_code.is_terminal() {
            info!("job is still in progress");
            return Ok(CorrelationOutcome::InProgress);
        }

        let finished_at = notification.finished_at()?;
        let record = match self
            .store
            .complete_job(&result.job_id, result, finished_at)
            .await
        {
            Ok(CompletionOutcome::Applied(record)) => record,
            Ok(CompletionOutcome::AlreadyTerminal(record)) => {
                info!("job already completed");
                record
            }
            Err(MetadataError::NotFound(_)) => return Err(unknown_job(&result.job_id)),
            Err(e) => return Err(e.into()),
        };
        self.signal_once(&record, notification.timestamp).await
    }

    /// Handle a change of the stored record.
    ///
    /// A record without a finish timestamp is still in progress. Otherwise the
    /// stored result is signalled, with the finish timestamp as the signal
    /// time, unless the workflow already has it.
    #[instrument(skip(self, record), fields(job_id = %record.job_id))]
    pub async fn on_record_update(
        &self,
        record: &CorrelationRecord,
    ) -> TransferResult<CorrelationOutcome> {
        let outcome = match record.finish_timestamp {
            Some(finished_at) => self.signal_once(record, finished_at).await,
            None => {
                info!("job is still in progress");
                Ok(CorrelationOutcome::InProgress)
            }
        };
        record_outcome(&outcome);
        outcome
    }

    /// Signal the stored result of a terminal record at most once.
    async fn signal_once(
        &self,
        record: &CorrelationRecord,
        timestamp: OffsetDateTime,
    ) -> TransferResult<CorrelationOutcome> {
        if record.signalled_at.is_some() {
            info!("workflow already signalled");
            return Ok(CorrelationOutcome::Duplicate);
        }
        let Some(task_token) = record.task_token.as_deref() else {
            info!("Cannot find the task token for job");
            return Ok(CorrelationOutcome::NoTaskToken);
        };
        let signal = match &record.job_result {
            Some(result) => CompletionSignal::for_result(result, timestamp)?,
            None => Some(CompletionSignal::Failure {
                error: String::new(),
                cause: String::new(),
            }),
        };
        let Some(signal) = signal else {
            return Ok(CorrelationOutcome::InProgress);
        };

        let claimed = match self
            .store
            .claim_signal(&record.job_id, OffsetDateTime::now_utc(), SIGNAL_LEASE)
            .await
        {
            Ok(claimed) => claimed,
            Err(MetadataError::NotFound(_)) => return Err(unknown_job(&record.job_id)),
            Err(e) => return Err(e.into()),
        };
        if !claimed {
            info!("workflow signalled or being signalled by another delivery");
            return Ok(CorrelationOutcome::Duplicate);
        }

        match self.send(task_token, &signal).await {
            Ok(outcome) => {
                self.store
                    .mark_signalled(&record.job_id, OffsetDateTime::now_utc())
                    .await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(release) = self.store.release_signal(&record.job_id).await {
                    error!(error = %release, "failed to release signal claim");
                }
                Err(e)
            }
        }
    }

    async fn send(
        &self,
        task_token: &str,
        signal: &CompletionSignal,
    ) -> TransferResult<CorrelationOutcome> {
        if signal.is_success() {
            info!("job succeeded, signalling workflow");
        } else {
            error!("job failed, signalling workflow");
        }
        deliver(self.signaler.as_ref(), task_token, signal).await?;
        Ok(CorrelationOutcome::Signalled {
            success: signal.is_success(),
        })
    }
}

fn unknown_job(job_id: &str) -> TransferError {
    error!("completion for unregistered job");
    TransferError::UnknownJob {
        job_id: job_id.to_string(),
    }
}

fn record_outcome(outcome: &TransferResult<CorrelationOutcome>) {
    match outcome {
        Ok(outcome) => metrics::record_notification(outcome.as_str()),
        Err(e) => metrics::record_notification(e.code()),
    }
}
