//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use sqlx::FromRow;
use time::OffsetDateTime;
use vaultlift_core::{CorrelationRecord, JobResult, PartDescriptor};

// =============================================================================
// Correlation records
// =============================================================================

/// Correlation record row. `job_result` holds the job description as JSON.
#[derive(Debug, Clone, FromRow)]
pub struct CorrelationRow {
    pub job_id: String,
    pub task_token: Option<String>,
    pub start_timestamp: OffsetDateTime,
    pub finish_timestamp: Option<OffsetDateTime>,
    pub job_result: Option<String>,
    pub signalled_at: Option<OffsetDateTime>,
}

impl CorrelationRow {
    pub fn from_record(record: &CorrelationRecord) -> MetadataResult<Self> {
        let job_result = record
            .job_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        Ok(Self {
            job_id: record.job_id.clone(),
            task_token: record.task_token.clone(),
            start_timestamp: record.start_timestamp,
            finish_timestamp: record.finish_timestamp,
            job_result,
            signalled_at: record.signalled_at,
        })
    }

    pub fn into_record(self) -> MetadataResult<CorrelationRecord> {
        let job_result = self
            .job_result
            .as_deref()
            .map(serde_json::from_str::<JobResult>)
            .transpose()?;
        Ok(CorrelationRecord {
            job_id: self.job_id,
            task_token: self.task_token.filter(|token| !token.is_empty()),
            start_timestamp: self.start_timestamp,
            finish_timestamp: self.finish_timestamp,
            job_result,
            signalled_at: self.signalled_at,
        })
    }
}

// =============================================================================
// Part ledger
// =============================================================================

/// Identity of one object transfer within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub run_id: String,
    pub object_id: String,
}

impl TransferKey {
    pub fn new(run_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            object_id: object_id.into(),
        }
    }

    /// Partition key shared by every part of the transfer.
    pub fn partition_key(&self) -> String {
        format!("{}:{}", self.run_id, self.object_id)
    }

    /// Sort key for one part. Zero-padded so lexical order is part order.
    pub fn part_sort_key(part_number: u32) -> String {
        format!("p:{:07}", part_number)
    }
}

impl std::fmt::Display for TransferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.partition_key())
    }
}

/// One uploaded part recorded in the ledger.
#[derive(Debug, Clone, FromRow)]
pub struct PartRow {
    pub pk: String,
    pub sk: String,
    pub part_number: i64,
    pub etag: String,
    pub checksum_sha256: String,
    pub tree_checksum: Option<String>,
    pub recorded_at: OffsetDateTime,
}

impl PartRow {
    pub fn new(key: &TransferKey, part: &PartDescriptor, recorded_at: OffsetDateTime) -> Self {
        Self {
            pk: key.partition_key(),
            sk: TransferKey::part_sort_key(part.part_number),
            part_number: i64::from(part.part_number),
            etag: part.etag.clone(),
            checksum_sha256: part.checksum_sha256.clone(),
            tree_checksum: part.tree_checksum.clone(),
            recorded_at,
        }
    }

    pub fn into_descriptor(self) -> MetadataResult<PartDescriptor> {
        let part_number = u32::try_from(self.part_number).map_err(|_| {
            MetadataError::Serialization(format!(
                "part number {} out of range in {}",
                self.part_number, self.pk
            ))
        })?;
        Ok(PartDescriptor {
            part_number,
            etag: self.etag,
            checksum_sha256: self.checksum_sha256,
            tree_checksum: self.tree_checksum,
        })
    }
}
