//! Descriptors for uploaded multipart parts.

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// Highest part number the object store accepts in one upload.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// A part committed to a multipart upload.
///
/// Serialized with the object store's field names so descriptors can be
/// handed straight back at completion time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDescriptor {
    /// One-based part number, unique within an upload.
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    /// Entity tag returned by the store.
    #[serde(rename = "ETag")]
    pub etag: String,
    /// Base64 SHA-256 of the part's bytes.
    #[serde(rename = "ChecksumSHA256")]
    pub checksum_sha256: String,
    /// Hex tree hash of the part, when it was verified against the vault.
    #[serde(
        rename = "TreeChecksum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tree_checksum: Option<String>,
}

impl PartDescriptor {
    pub fn new(part_number: u32, etag: impl Into<String>, checksum: &ContentHash) -> Self {
        Self {
            part_number,
            etag: etag.into(),
            checksum_sha256: checksum.to_base64(),
            tree_checksum: None,
        }
    }

    /// Attach the verified tree hash.
    pub fn with_tree_checksum(mut self, tree_checksum: impl Into<String>) -> Self {
        self.tree_checksum = Some(tree_checksum.into());
        self
    }

    /// Decode the part checksum.
    pub fn checksum(&self) -> crate::Result<ContentHash> {
        ContentHash::from_base64(&self.checksum_sha256)
    }

    /// Validate the part number and checksum encoding.
    pub fn validate(&self) -> crate::Result<()> {
        check_part_number(self.part_number)?;
        self.checksum().map(|_| ())
    }
}

/// Reject part numbers outside `1..=MAX_PART_NUMBER`.
pub fn check_part_number(part_number: u32) -> crate::Result<()> {
    if part_number == 0 {
        return Err(crate::Error::InvalidPart(
            "part numbers start at 1".to_string(),
        ));
    }
    if part_number > MAX_PART_NUMBER {
        return Err(crate::Error::InvalidPart(format!(
            "part number {part_number} exceeds {MAX_PART_NUMBER}"
        )));
    }
    Ok(())
}

/// Sort descriptors by part number, as completion requires.
pub fn sort_by_part_number(parts: &mut [PartDescriptor]) {
    parts.sort_by_key(|part| part.part_number);
}
