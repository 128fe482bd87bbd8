//! SHA-256 tree hash as computed by the vault service.
//!
//! Input is split into fixed-size segments (1 MiB unless configured) and
//! each segment is hashed into a leaf. Adjacent digests are then paired
//! left-to-right and hashed as `SHA256(left || right)` level by level; an
//! unpaired trailing digest is promoted unchanged. The single remaining digest
//! is the tree hash.
//!
//! [`TreeHasher`] keeps a stack of completed subtrees instead of every leaf, so
//! memory is logarithmic in the input size. Subtrees of equal height are merged
//! as soon as they appear; on finalization the stack is folded from the right,
//! which is the same as promoting unpaired digests at each level.

use sha2::{Digest, Sha256};

use crate::hash::ContentHash;

/// Segment size used by the vault service.
pub const DEFAULT_SEGMENT_SIZE: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug)]
struct Subtree {
    height: u32,
    hash: ContentHash,
}

/// Incremental tree-hash computer.
#[derive(Clone)]
pub struct TreeHasher {
    segment_size: usize,
    segment: Sha256,
    segment_len: usize,
    stack: Vec<Subtree>,
    total_len: u64,
}

impl TreeHasher {
    /// Create a hasher with the service's 1 MiB segment size.
    pub fn new() -> Self {
        Self::with_segment_size(DEFAULT_SEGMENT_SIZE)
    }

    /// Create a hasher with a custom segment size.
    ///
    /// A zero segment size is treated as one byte.
    pub fn with_segment_size(segment_size: usize) -> Self {
        Self {
            segment_size: segment_size.max(1),
            segment: Sha256::new(),
            segment_len: 0,
            stack: Vec::new(),
            total_len: 0,
        }
    }

    /// Feed more data. May be called any number of times.
    pub fn update(&mut self, mut data: &[u8]) {
        self.total_len += data.len() as u64;
        while !data.is_empty() {
            let take = (self.segment_size - self.segment_len).min(data.len());
            self.segment.update(&data[..take]);
            self.segment_len += take;
            data = &data[take..];

            if self.segment_len == self.segment_size {
                let leaf = ContentHash::from_bytes(self.segment.finalize_reset().into());
                self.segment_len = 0;
                self.push(leaf);
            }
        }
    }

    /// Number of bytes fed so far.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// The root digest, or `None` when no data has been fed.
    pub fn root(&self) -> Option<ContentHash> {
        let mut stack = self.stack.clone();
        if self.segment_len > 0 {
            stack.push(Subtree {
                height: 0,
                hash: ContentHash::from_bytes(self.segment.clone().finalize().into()),
            });
        }
        stack
            .into_iter()
            .rev()
            .map(|subtree| subtree.hash)
            .reduce(|right, left| ContentHash::combine(&left, &right))
    }

    /// The root digest as raw bytes; empty when no data has been fed.
    pub fn digest(&self) -> Vec<u8> {
        self.root()
            .map(|hash| hash.as_bytes().to_vec())
            .unwrap_or_default()
    }

    /// The root digest as lowercase hex; empty when no data has been fed.
    pub fn hex_digest(&self) -> String {
        self.root().map(|hash| hash.to_hex()).unwrap_or_default()
    }

    /// Compare against a hex checksum reported by the vault service.
    pub fn matches_hex(&self, expected: &str) -> bool {
        self.hex_digest().eq_ignore_ascii_case(expected.trim())
    }

    /// Reduce already-computed tree hashes into their parent tree hash.
    ///
    /// The inputs may be leaves, or the roots of adjacent ranges whose sizes
    /// are the same power-of-two multiple of the segment size (all but the
    /// last), as produced by the archive planner. Returns `None` for an empty
    /// slice.
    pub fn combine(hashes: &[ContentHash]) -> Option<ContentHash> {
        let mut level = hashes.to_vec();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => ContentHash::combine(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
        }
        level.pop()
    }

    fn push(&mut self, hash: ContentHash) {
        let mut node = Subtree { height: 0, hash };
        while let Some(left) = self
            .stack
            .last()
            .copied()
            .filter(|top| top.height == node.height)
        {
            self.stack.pop();
            node = Subtree {
                height: node.height + 1,
                hash: ContentHash::combine(&left.hash, &node.hash),
            };
        }
        self.stack.push(node);
    }
}

impl Default for TreeHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Tree hash of an in-memory buffer with the default segment size.
pub fn tree_hash(data: &[u8]) -> Option<ContentHash> {
    let mut hasher = TreeHasher::new();
    hasher.update(data);
    hasher.root()
}
