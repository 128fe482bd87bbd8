//! Messages that cross the queue between planning and transfer workers.
//!
//! Field names follow the workflow's JSON payloads; byte ranges travel as
//! `"start-end"` strings.

use crate::error::TransferResult;
use crate::facilitator::{JobRange, PartTarget, TransferFacilitator};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};
use vaultlift_core::{
    ByteRange, Chunk, ContentHash, PartDescriptor, ResumePoint, plan_archive, plan_inventory,
};
use vaultlift_metadata::repos::check_contiguous;
use vaultlift_metadata::{MetadataStore, TransferKey};
use vaultlift_storage::{MultipartClient, ResumableMultipartUploader};

fn range_strings(ranges: Vec<ByteRange>) -> Vec<String> {
    ranges.iter().map(ByteRange::to_string).collect()
}

/// Request to split an archive into transfer ranges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveChunkRequest {
    pub archive_size: u64,
    pub archive_chunk_size: u64,
}

impl ArchiveChunkRequest {
    pub fn plan(&self) -> TransferResult<Vec<String>> {
        Ok(range_strings(plan_archive(
            self.archive_size,
            self.archive_chunk_size,
        )?))
    }
}

/// Request to split an inventory listing into overlapping ranges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryChunkRequest {
    pub inventory_size: u64,
    pub maximum_inventory_record_size: u64,
    pub chunk_size: u64,
}

impl InventoryChunkRequest {
    pub fn plan(&self) -> TransferResult<Vec<String>> {
        Ok(range_strings(plan_inventory(
            self.inventory_size,
            self.maximum_inventory_record_size,
            self.chunk_size,
        )?))
    }
}

/// One archive range to move into one part of a shared upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetrievalTask {
    pub job_id: String,
    pub vault_name: String,
    pub byte_range: ByteRange,
    pub s3_destination_bucket: String,
    pub s3_destination_key: String,
    pub upload_id: String,
    pub part_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,
}

impl RetrievalTask {
    pub fn source(&self) -> JobRange {
        JobRange {
            job_id: self.job_id.clone(),
            vault_name: self.vault_name.clone(),
            range: self.byte_range,
        }
    }

    pub fn target(&self) -> PartTarget {
        PartTarget {
            bucket: self.s3_destination_bucket.clone(),
            key: self.s3_destination_key.clone(),
            upload_id: self.upload_id.clone(),
            part_number: self.part_number,
        }
    }

    /// Ledger key: the archive id when known, else the job id.
    pub fn transfer_key(&self, run_id: &str) -> TransferKey {
        TransferKey::new(run_id, self.archive_id.as_deref().unwrap_or(&self.job_id))
    }

    /// Transfer the range and record the part in the ledger.
    #[instrument(skip(self, facilitator, ledger), fields(job_id = %self.job_id, part_number = self.part_number))]
    pub async fn execute(
        &self,
        facilitator: &TransferFacilitator,
        ledger: &dyn MetadataStore,
        run_id: &str,
    ) -> TransferResult<PartDescriptor> {
        let part = facilitator
            .transfer_chunk(&self.source(), &self.target())
            .await?;
        ledger
            .record_part(&self.transfer_key(run_id), &part, OffsetDateTime::now_utc())
            .await?;
        Ok(part)
    }
}

/// One overlapping inventory range to trim and upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryPartTask {
    pub job_id: String,
    pub vault_name: String,
    pub byte_range: ByteRange,
    pub is_first: bool,
    pub is_last: bool,
    pub maximum_inventory_record_size: usize,
    pub s3_destination_bucket: String,
    pub s3_destination_key: String,
    pub upload_id: String,
    pub part_number: u32,
}

impl InventoryPartTask {
    /// Tasks for every range of an inventory plan, numbered from part 1.
    pub fn for_plan(
        template: &InventoryPartTask,
        ranges: &[ByteRange],
    ) -> Vec<InventoryPartTask> {
        Chunk::from_plan(ranges)
            .into_iter()
            .zip(1u32..)
            .map(|(chunk, part_number)| InventoryPartTask {
                byte_range: chunk.range,
                is_first: chunk.is_first,
                is_last: chunk.is_last,
                part_number,
                ..template.clone()
            })
            .collect()
    }

    /// Trim and upload the range. `None` means the range trimmed to nothing
    /// and `part_number` must be skipped at completion.
    pub async fn execute(
        &self,
        facilitator: &TransferFacilitator,
    ) -> TransferResult<Option<PartDescriptor>> {
        let source = JobRange {
            job_id: self.job_id.clone(),
            vault_name: self.vault_name.clone(),
            range: self.byte_range,
        };
        let chunk = Chunk {
            range: self.byte_range,
            is_first: self.is_first,
            is_last: self.is_last,
        };
        let target = PartTarget {
            bucket: self.s3_destination_bucket.clone(),
            key: self.s3_destination_key.clone(),
            upload_id: self.upload_id.clone(),
            part_number: self.part_number,
        };
        facilitator
            .transfer_inventory_chunk(&source, chunk, self.maximum_inventory_record_size, &target)
            .await
    }
}

/// Complete a shared upload from the parts its workers recorded.
///
/// The finalizer never sees the bytes: it resumes the upload by id, includes
/// every ledger part and completes with the composite checksum.
#[instrument(skip(multipart, ledger, key), fields(transfer = %key))]
pub async fn complete_from_ledger(
    multipart: Arc<dyn MultipartClient>,
    ledger: &dyn MetadataStore,
    key: &TransferKey,
    bucket: &str,
    object_key: &str,
    upload_id: &str,
) -> TransferResult<ContentHash> {
    let parts = ledger.list_parts(key).await?;
    check_contiguous(key, &parts)?;

    let next_part_number = match parts.last() {
        Some(last) => last.part_number.checked_add(1).ok_or_else(|| {
            vaultlift_core::Error::InvalidPart(format!(
                "part number {} has no successor",
                last.part_number
            ))
        })?,
        None => 1,
    };
    let mut uploader = ResumableMultipartUploader::resume(
        multipart,
        bucket,
        object_key,
        ResumePoint {
            upload_id: upload_id.to_string(),
            next_part_number,
        },
    );
    for part in parts {
        uploader.include(part)?;
    }
    let checksum = uploader.complete_upload().await?;
    metrics::UPLOADS_COMPLETED.inc();
    info!(checksum = %checksum.to_base64(), "completed upload from ledger");
    Ok(checksum)
}
