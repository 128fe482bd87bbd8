//! Byte-range planning for archives and inventory listings.
//!
//! Both planners return ranges that cover `[0, size - 1]` contiguously and in
//! order. Archive ranges are disjoint. Inventory ranges overlap by
//! `max_record_size` bytes so any record crossing a boundary is whole in the
//! next range.

use crate::range::ByteRange;
use crate::{Error, Result};

/// Split an archive into ranges of `chunk_size` bytes.
///
/// The vault service only verifies tree hashes for ranges aligned to
/// power-of-two multiples of a megabyte, so `chunk_size` must be a power of
/// two. The final range may be shorter.
pub fn plan_archive(size: u64, chunk_size: u64) -> Result<Vec<ByteRange>> {
    if !chunk_size.is_power_of_two() {
        return Err(Error::InvalidChunkSize { size: chunk_size });
    }
    if size == 0 {
        return Ok(Vec::new());
    }

    let mut ranges = Vec::with_capacity(size.div_ceil(chunk_size) as usize);
    let mut start = 0u64;
    loop {
        let end = start.saturating_add(chunk_size - 1).min(size - 1);
        ranges.push(ByteRange::new(start, end)?);
        if end == size - 1 {
            break;
        }
        start = end + 1;
    }
    Ok(ranges)
}

/// Split an inventory listing into overlapping ranges.
///
/// Range `i + 1` starts at `end(i) - max_record_size + 1`.
pub fn plan_inventory(size: u64, max_record_size: u64, chunk_size: u64) -> Result<Vec<ByteRange>> {
    if chunk_size <= max_record_size {
        return Err(Error::ChunkTooSmall {
            chunk_size,
            max_record_size,
        });
    }
    if size == 0 {
        return Ok(Vec::new());
    }

    let mut ranges = Vec::new();
    let mut start = 0u64;
    loop {
        let end = start.saturating_add(chunk_size - 1).min(size - 1);
        ranges.push(ByteRange::new(start, end)?);
        if end == size - 1 {
            break;
        }
        start = end + 1 - max_record_size;
    }
    Ok(ranges)
}
