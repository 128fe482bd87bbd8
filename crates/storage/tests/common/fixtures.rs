use bytes::Bytes;
use vaultlift_core::ContentHash;

/// Hex SHA-256 of `data`, for comparing whole objects.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    ContentHash::compute(data).to_hex()
}

/// `len` pseudo-random bytes from a xorshift generator; equal seeds give
/// equal output.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut state = seed | 1;
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    Bytes::from(out)
}
