//! Inclusive byte ranges and the chunks that partition an object.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An inclusive byte range `start..=end`.
///
/// Crosses process and queue boundaries as the ASCII string `"start-end"`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Create a range, rejecting `end < start`.
    pub fn new(start: u64, end: u64) -> crate::Result<Self> {
        if end < start {
            return Err(crate::Error::InvalidByteRange(format!(
                "end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// First byte offset (inclusive).
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte offset (inclusive).
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A valid range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// HTTP `Range` header value for this range.
    pub fn to_http_range(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Debug for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteRange({}-{})", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for ByteRange {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| crate::Error::InvalidByteRange(format!("missing '-' in {s:?}")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|e| crate::Error::InvalidByteRange(format!("{s:?}: {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

impl Serialize for ByteRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByteRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A range plus its position relative to the object it partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Bytes covered by this chunk.
    pub range: ByteRange,
    /// Whether this is the first chunk of the object.
    pub is_first: bool,
    /// Whether this is the last chunk of the object.
    pub is_last: bool,
}

impl Chunk {
    /// Tag each range of a plan with its first/last role.
    pub fn from_plan(ranges: &[ByteRange]) -> Vec<Chunk> {
        let count = ranges.len();
        ranges
            .iter()
            .enumerate()
            .map(|(i, range)| Chunk {
                range: *range,
                is_first: i == 0,
                is_last: i + 1 == count,
            })
            .collect()
    }
}
