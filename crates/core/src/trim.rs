//! Trimming of overlapping inventory chunks to whole records.
//!
//! Inventory listings are newline-delimited. Chunks produced by
//! [`plan_inventory`](crate::plan::plan_inventory) overlap by the maximum
//! record size, so each record boundary near a chunk edge is visible to both
//! neighbours. Trimming keeps every record exactly once: a chunk drops the
//! head already emitted by its predecessor and hands its partial tail to its
//! successor.

use bytes::Bytes;

use crate::{Error, Result};

/// Trim `chunk` so that it begins and ends on record boundaries.
///
/// When not first, everything before the last newline within the first
/// `max_record_size` bytes is dropped; the newline itself is kept. When not
/// last, the final newline and everything after it are dropped. The first and
/// last chunk of a single-chunk object is returned unchanged.
pub fn trim_record_boundaries(
    chunk: Bytes,
    is_first: bool,
    is_last: bool,
    max_record_size: usize,
) -> Result<Bytes> {
    let mut chunk = chunk;

    if !is_first {
        let window = max_record_size.min(chunk.len());
        let start = last_newline(&chunk[..window]).ok_or(Error::NoRecordBoundary {
            window: max_record_size,
        })?;
        chunk = chunk.slice(start..);
    }

    if !is_last {
        let end = last_newline(&chunk).ok_or(Error::NoRecordBoundary {
            window: chunk.len(),
        })?;
        chunk = chunk.slice(..end);
    }

    Ok(chunk)
}

fn last_newline(data: &[u8]) -> Option<usize> {
    data.iter().rposition(|&b| b == b'\n')
}
