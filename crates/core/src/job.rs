//! Vault job results and the correlation records that track them.
//!
//! A vault retrieval job finishes minutes to hours after it is requested. The
//! caller that requested it registers a [`CorrelationRecord`] holding the
//! workflow task token, then parks. When the job finishes, the completion is
//! merged into the record and the workflow is signalled with a
//! [`CompletionSignal`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::{Error, Result};

/// Job status as reported by the vault service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }
}

/// Job description delivered on completion.
///
/// Fields the correlator reads are typed; everything else the service sends
/// is kept verbatim in `extra` and passed through to the workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(rename = "JobId")]
    pub job_id: String,
    #[serde(rename = "StatusCode")]
    pub status_code: JobStatus,
    #[serde(
        rename = "StatusMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_message: Option<String>,
    #[serde(
        rename = "CompletionDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub completion_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobResult {
    pub fn new(job_id: impl Into<String>, status_code: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status_code,
            status_message: None,
            completion_date: None,
            extra: Map::new(),
        }
    }

    /// Parse the completion date, if the service sent one.
    pub fn completed_at(&self) -> Result<Option<OffsetDateTime>> {
        self.completion_date
            .as_deref()
            .map(|date| {
                OffsetDateTime::parse(date, &Rfc3339).map_err(|e| {
                    Error::InvalidNotification(format!("bad CompletionDate {date:?}: {e}"))
                })
            })
            .transpose()
    }
}

/// A push notification carrying a job result.
#[derive(Clone, Debug, PartialEq)]
pub struct JobNotification {
    pub result: JobResult,
    /// When the notification was published.
    pub timestamp: OffsetDateTime,
}

impl JobNotification {
    /// Parse the JSON message body of a notification.
    pub fn parse(message: &str, timestamp: OffsetDateTime) -> Result<Self> {
        let result = serde_json::from_str(message)
            .map_err(|e| Error::InvalidNotification(e.to_string()))?;
        Ok(Self { result, timestamp })
    }

    /// When the job finished: the service's completion date, falling back to
    /// the publish time.
    pub fn finished_at(&self) -> Result<OffsetDateTime> {
        Ok(self.result.completed_at()?.unwrap_or(self.timestamp))
    }
}

/// Lifecycle of a correlation record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelationState {
    InProgress,
    Terminal(JobStatus),
}

/// Persisted link between a vault job and the workflow waiting on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_token: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_timestamp: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub finish_timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_result: Option<JobResult>,
    /// When the workflow acknowledged the completion signal. Unset until a
    /// signal was delivered, so a failed delivery can be retried.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub signalled_at: Option<OffsetDateTime>,
}

impl CorrelationRecord {
    /// A record for a job that has been requested but not finished.
    pub fn new(
        job_id: impl Into<String>,
        task_token: Option<String>,
        start_timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            task_token: task_token.filter(|token| !token.is_empty()),
            start_timestamp,
            finish_timestamp: None,
            job_result: None,
            signalled_at: None,
        }
    }

    pub fn state(&self) -> CorrelationState {
        match (&self.finish_timestamp, &self.job_result) {
            (Some(_), Some(result)) => CorrelationState::Terminal(result.status_code),
            (Some(_), None) => CorrelationState::Terminal(JobStatus::Failed),
            (None, _) => CorrelationState::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finish_timestamp.is_some()
    }
}

/// What to tell the waiting workflow once a job is terminal.
#[derive(Clone, Debug, PartialEq)]
pub enum CompletionSignal {
    Success { output: String },
    Failure { error: String, cause: String },
}

impl CompletionSignal {
    /// Build the signal for a terminal job result.
    ///
    /// Success carries `{"job_result": <result>, "timestamp": <rfc3339>}`.
    /// Failure carries the status message as the error. Returns `None` for a
    /// job still in progress.
    pub fn for_result(result: &JobResult, timestamp: OffsetDateTime) -> Result<Option<Self>> {
        match result.status_code {
            JobStatus::InProgress => Ok(None),
            JobStatus::Succeeded => {
                let timestamp = timestamp
                    .format(&Rfc3339)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                let output = serde_json::json!({
                    "job_result": result,
                    "timestamp": timestamp,
                });
                Ok(Some(Self::Success {
                    output: output.to_string(),
                }))
            }
            JobStatus::Failed => Ok(Some(Self::Failure {
                error: result.status_message.clone().unwrap_or_default(),
                cause: String::new(),
            })),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
