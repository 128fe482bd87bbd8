//! SHA-256 digests as they appear on the wire.
//!
//! The vault reports tree hashes as lowercase hex; the object store expects
//! part and composite checksums as base64. [`ContentHash`] holds the raw 32
//! bytes and converts between the two.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{Error, Result};

const DIGEST_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; DIGEST_LEN]);

impl ContentHash {
    fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        <[u8; DIGEST_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| Error::InvalidHash(format!("digest is {} bytes, want 32", bytes.len())))
    }

    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// One-shot digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Digest of `left || right`, the interior step of the tree hash.
    pub fn combine(left: &ContentHash, right: &ContentHash) -> Self {
        let digest = Sha256::new()
            .chain_update(left.0)
            .chain_update(right.0)
            .finalize();
        Self(digest.into())
    }

    pub fn hasher() -> ContentHasher {
        ContentHasher(Sha256::new())
    }

    /// Decode the object store's base64 form.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| Error::InvalidHash(format!("bad base64 digest: {e}")))?;
        Self::parse_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decode the vault's hex form. Upper and lower case are accepted.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        if encoded.len() != DIGEST_LEN * 2 {
            return Err(Error::InvalidHash(format!(
                "hex digest is {} chars, want 64",
                encoded.len()
            )));
        }
        let mut out = [0u8; DIGEST_LEN];
        for (byte, pair) in out.iter_mut().zip(encoded.as_bytes().chunks_exact(2)) {
            *byte = (nibble(pair[0])? << 4) | nibble(pair[1])?;
        }
        Ok(Self(out))
    }

    pub fn to_hex(&self) -> String {
        use fmt::Write;
        self.0.iter().fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }
}

fn nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Error::InvalidHash(format!(
            "{:?} is not a hex digit",
            char::from(c)
        ))),
    }
}

impl TryFrom<&[u8]> for ContentHash {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::parse_bytes(bytes)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentHash").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Streaming SHA-256.
pub struct ContentHasher(Sha256);

impl ContentHasher {
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> ContentHash {
        ContentHash(self.0.finalize().into())
    }
}
