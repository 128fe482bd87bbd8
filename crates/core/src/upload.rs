//! Multipart upload session state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::composite::CompositeChecksum;
use crate::part::{PartDescriptor, check_part_number};

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Session is open and accepting parts.
    Open,
    /// Session was finalized in the object store.
    Completed,
}

/// Where a resumed uploader picks up: the upload id plus the next unused
/// part number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub upload_id: String,
    pub next_part_number: u32,
}

/// A multipart upload owned by one process at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// Store-issued upload id.
    pub upload_id: String,
    /// Next part number handed out by this session.
    pub next_part_number: u32,
    parts: BTreeMap<u32, PartDescriptor>,
    /// Numbers that were allocated but intentionally left without data.
    #[serde(default)]
    skipped: BTreeSet<u32>,
    /// Current session state.
    pub state: UploadState,
}

impl UploadSession {
    /// Session for a freshly created upload.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
    ) -> Self {
        Self::resume(bucket, key, upload_id, 1)
    }

    /// Session reconstructed from a persisted upload id.
    pub fn resume(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        next_part_number: u32,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            next_part_number: next_part_number.max(1),
            parts: BTreeMap::new(),
            skipped: BTreeSet::new(),
            state: UploadState::Open,
        }
    }

    /// Hand out the next part number. Fails once the store's part limit is
    /// reached.
    pub fn allocate_part_number(&mut self) -> crate::Result<u32> {
        let number = self.next_part_number;
        check_part_number(number)?;
        self.next_part_number = number + 1;
        Ok(number)
    }

    /// Register a committed part, replacing any earlier descriptor with the
    /// same number. Part numbers included from other workers advance the
    /// allocator past them.
    pub fn record_part(&mut self, part: PartDescriptor) -> crate::Result<()> {
        part.validate()?;
        self.advance_past(part.part_number);
        self.skipped.remove(&part.part_number);
        self.parts.insert(part.part_number, part);
        Ok(())
    }

    /// Mark a part number as deliberately empty. The number counts as present
    /// for gap checks and takes no position in the composite checksum.
    pub fn skip_part(&mut self, part_number: u32) -> crate::Result<()> {
        check_part_number(part_number)?;
        if self.parts.contains_key(&part_number) {
            return Err(crate::Error::InvalidPart(format!(
                "part {part_number} already has data"
            )));
        }
        self.advance_past(part_number);
        self.skipped.insert(part_number);
        Ok(())
    }

    fn advance_past(&mut self, part_number: u32) {
        if let Some(next) = part_number.checked_add(1) {
            self.next_part_number = self.next_part_number.max(next);
        }
    }

    /// Parts ordered by part number.
    pub fn parts(&self) -> impl Iterator<Item = &PartDescriptor> {
        self.parts.values()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Highest part number registered or skipped so far.
    pub fn max_part_number(&self) -> Option<u32> {
        let parts = self.parts.keys().next_back().copied();
        let skipped = self.skipped.last().copied();
        parts.max(skipped)
    }

    /// Part numbers in `1..=max` that were neither registered nor skipped.
    pub fn missing_parts(&self) -> Vec<u32> {
        let max = self.max_part_number().unwrap_or(0);
        (1..=max)
            .filter(|n| !self.parts.contains_key(n) && !self.skipped.contains(n))
            .collect()
    }

    /// Composite checksum over the registered parts. Each part sits at its
    /// number minus one, less the skipped numbers below it.
    pub fn composite_checksum(&self) -> crate::Result<CompositeChecksum> {
        let mut composite = CompositeChecksum::with_capacity(self.parts.len());
        for part in self.parts.values() {
            let skipped_below = self.skipped.range(..part.part_number).count();
            let position = part.part_number as usize - 1 - skipped_below;
            composite.include_at(position, part.checksum()?);
        }
        Ok(composite)
    }

    pub fn resume_point(&self) -> ResumePoint {
        ResumePoint {
            upload_id: self.upload_id.clone(),
            next_part_number: self.next_part_number,
        }
    }

    pub fn mark_completed(&mut self) {
        self.state = UploadState::Completed;
    }

    pub fn is_completed(&self) -> bool {
        self.state == UploadState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use crate::part::MAX_PART_NUMBER;

    fn part(number: u32) -> PartDescriptor {
        let data = format!("part-{number}");
        PartDescriptor::new(
            number,
            format!("etag-{number}"),
            &ContentHash::compute(data.as_bytes()),
        )
    }

    #[test]
    fn test_completion_flag() {
        let mut session = UploadSession::new("bucket", "key", "upload");
        assert!(!session.is_completed());
        session.mark_completed();
        assert!(session.is_completed());
        assert_eq!(session.state, UploadState::Completed);
    }

    #[test]
    fn test_allocation_is_monotonic() {
        let mut session = UploadSession::new("bucket", "key", "upload");
        assert_eq!(session.allocate_part_number().unwrap(), 1);
        assert_eq!(session.allocate_part_number().unwrap(), 2);

        let mut resumed = UploadSession::resume("bucket", "key", "upload", 7);
        assert_eq!(resumed.allocate_part_number().unwrap(), 7);
        assert_eq!(resumed.resume_point().next_part_number, 8);
    }

    #[test]
    fn test_allocation_stops_at_part_limit() {
        let mut session = UploadSession::resume("bucket", "key", "upload", MAX_PART_NUMBER);
        assert_eq!(session.allocate_part_number().unwrap(), MAX_PART_NUMBER);
        assert!(session.allocate_part_number().is_err());
        assert!(session.allocate_part_number().is_err());
        assert_eq!(session.resume_point().next_part_number, MAX_PART_NUMBER + 1);
    }

    #[test]
    fn test_record_part_advances_allocator() {
        let mut session = UploadSession::new("bucket", "key", "upload");
        session.record_part(part(5)).unwrap();
        assert_eq!(session.allocate_part_number().unwrap(), 6);
        assert_eq!(session.missing_parts(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_record_part_rejects_out_of_range_numbers() {
        let mut session = UploadSession::new("bucket", "key", "upload");
        assert!(session.record_part(part(u32::MAX)).is_err());
        assert!(session.record_part(part(MAX_PART_NUMBER + 1)).is_err());
        assert_eq!(session.part_count(), 0);
        assert_eq!(session.resume_point().next_part_number, 1);

        session.record_part(part(MAX_PART_NUMBER)).unwrap();
        assert!(session.allocate_part_number().is_err());
    }

    #[test]
    fn test_skipped_parts_close_gaps() {
        let mut session = UploadSession::new("bucket", "key", "upload");
        session.record_part(part(1)).unwrap();
        session.skip_part(2).unwrap();
        session.record_part(part(3)).unwrap();
        assert!(session.missing_parts().is_empty());
        assert_eq!(session.allocate_part_number().unwrap(), 4);

        let composite = session.composite_checksum().unwrap();
        assert!(composite.is_complete());
        assert_eq!(composite.len(), 2);

        let mut expected = CompositeChecksum::new();
        expected.include(part(1).checksum().unwrap());
        expected.include(part(3).checksum().unwrap());
        assert_eq!(composite.digest().unwrap(), expected.digest().unwrap());

        assert!(session.skip_part(3).is_err());
        assert!(session.skip_part(0).is_err());
    }

    #[test]
    fn test_parts_are_ordered() {
        let mut session = UploadSession::new("bucket", "key", "upload");
        for n in [3, 1, 2] {
            session.record_part(part(n)).unwrap();
        }
        let numbers: Vec<u32> = session.parts().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(session.missing_parts().is_empty());
        assert!(session.composite_checksum().unwrap().is_complete());
    }

    #[test]
    fn test_rejects_part_zero() {
        let mut session = UploadSession::new("bucket", "key", "upload");
        assert!(session.record_part(part(0)).is_err());
        assert_eq!(session.part_count(), 0);
    }

    #[test]
    fn test_composite_reports_gaps() {
        let mut session = UploadSession::new("bucket", "key", "upload");
        session.record_part(part(1)).unwrap();
        session.record_part(part(3)).unwrap();
        let composite = session.composite_checksum().unwrap();
        assert_eq!(composite.missing(), vec![1]);
        assert!(composite.digest().is_err());
    }
}
