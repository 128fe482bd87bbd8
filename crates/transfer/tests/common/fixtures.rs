use bytes::Bytes;
use std::sync::Arc;
use vaultlift_metadata::SqliteStore;

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

/// CSV-like inventory with records of varying length, each at most 51 bytes
/// including the newline.
#[allow(dead_code)]
pub fn inventory_bytes(records: usize) -> Bytes {
    let mut out = String::new();
    for i in 0..records {
        out.push_str(&format!("line-{i:04},{}\n", "x".repeat(i % 40)));
    }
    Bytes::from(out)
}

/// Job description as the vault publishes it.
#[allow(dead_code)]
pub fn job_message(job_id: &str, status: &str, status_message: &str) -> String {
    serde_json::json!({
        "JobId": job_id,
        "Action": "ArchiveRetrieval",
        "StatusCode": status,
        "StatusMessage": status_message,
        "CompletionDate": "2024-05-01T12:30:00.000Z",
    })
    .to_string()
}

/// SQLite store in a temporary directory. Keep the directory alive.
#[allow(dead_code)]
pub async fn open_store() -> (tempfile::TempDir, Arc<SqliteStore>) {
    vaultlift_transfer::telemetry::init_tracing("warn");
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("metadata.db"))
        .await
        .unwrap();
    (dir, Arc::new(store))
}
