//! Composite checksum over the parts of a multipart upload.
//!
//! The object store verifies a completed upload against
//! `SHA256(checksum(part 1) || checksum(part 2) || ...)`, where each part
//! checksum is the SHA-256 of that part's bytes. Parts finish out of order
//! when several workers share an upload, so hashes are placed by position and
//! the digest refuses to run until every position is filled.

use crate::hash::ContentHash;
use crate::{Error, Result};

/// Order-sensitive checksum chained over per-part SHA-256 digests.
#[derive(Clone, Debug, Default)]
pub struct CompositeChecksum {
    slots: Vec<Option<ContentHash>>,
    filled: usize,
}

impl CompositeChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size for `parts` positions.
    pub fn with_capacity(parts: usize) -> Self {
        Self {
            slots: vec![None; parts],
            filled: 0,
        }
    }

    /// Checksum of a single part's bytes.
    pub fn part_checksum(data: &[u8]) -> ContentHash {
        ContentHash::compute(data)
    }

    /// Append a hash after the last position and return its index.
    pub fn include(&mut self, hash: ContentHash) -> usize {
        let index = self.slots.len();
        self.include_at(index, hash);
        index
    }

    /// Place a hash at `index` (zero-based), growing or overwriting as needed.
    pub fn include_at(&mut self, index: usize, hash: ContentHash) {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        if self.slots[index].replace(hash).is_none() {
            self.filled += 1;
        }
    }

    /// Number of positions known so far, filled or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of positions holding a hash.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// True when every position up to the highest one is filled.
    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Zero-based positions that are still empty.
    pub fn missing(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.is_none().then_some(i))
            .collect()
    }

    /// SHA-256 over the concatenated hashes in position order.
    pub fn digest(&self) -> Result<ContentHash> {
        if !self.is_complete() {
            return Err(Error::IncompleteComposite {
                missing: self.missing(),
            });
        }
        let mut hasher = ContentHash::hasher();
        for hash in self.slots.iter().flatten() {
            hasher.update(hash.as_bytes());
        }
        Ok(hasher.finalize())
    }
}
