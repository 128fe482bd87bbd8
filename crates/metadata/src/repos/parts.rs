//! Part ledger repository.
//!
//! Workers sharing one multipart upload record their parts here so that a
//! finalizer that never saw the bytes can complete the upload.

use crate::error::{MetadataError, MetadataResult};
use crate::models::TransferKey;
use async_trait::async_trait;
use time::OffsetDateTime;
use vaultlift_core::PartDescriptor;

/// Repository for uploaded part descriptors.
#[async_trait]
pub trait PartRepo: Send + Sync {
    /// Record a part. Re-recording the same part number replaces it, so a
    /// retried worker overwrites its earlier attempt.
    async fn record_part(
        &self,
        key: &TransferKey,
        part: &PartDescriptor,
        recorded_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// All recorded parts for a transfer, ordered by part number.
    async fn list_parts(&self, key: &TransferKey) -> MetadataResult<Vec<PartDescriptor>>;

    /// Number of recorded parts for a transfer.
    async fn count_parts(&self, key: &TransferKey) -> MetadataResult<u64>;
}

/// Check that ordered parts cover 1..=max without gaps.
pub fn check_contiguous(key: &TransferKey, parts: &[PartDescriptor]) -> MetadataResult<()> {
    let max = parts.last().map(|part| part.part_number).unwrap_or(0);
    let mut present = vec![false; max as usize];
    for part in parts {
        if let Some(slot) = (part.part_number as usize)
            .checked_sub(1)
            .and_then(|index| present.get_mut(index))
        {
            *slot = true;
        }
    }
    let missing: Vec<u32> = present
        .iter()
        .enumerate()
        .filter(|(_, seen)| !**seen)
        .map(|(index, _)| index as u32 + 1)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MetadataError::LedgerGaps {
            transfer: key.partition_key(),
            missing,
        })
    }
}
