// End-to-end tests of the read and upload halves against in-memory services.
// Ranges are planned, read once each, checked against the vault checksum and
// uploaded as parts by independent uploaders sharing one upload id.

mod common;

use bytes::Bytes;
use common::{BrokenStreamVault, RecordingMultipart, seeded_bytes, sha256_hash};
use std::sync::Arc;
use vaultlift_core::{ContentHash, TreeHasher, plan_archive};
use vaultlift_storage::error::StorageError;
use vaultlift_storage::{
    ColdStorageReader, MemoryMultipart, MemoryVault, MultipartClient, ResumableMultipartUploader,
};

const MIB: usize = 1024 * 1024;

#[tokio::test]
async fn test_ranges_verify_against_vault_and_whole_archive() {
    let data = seeded_bytes(7, 5 * MIB + 1234);
    let vault = MemoryVault::new();
    vault.insert_job("vault", "job", data.clone()).await;

    let ranges = plan_archive(data.len() as u64, 2 * MIB as u64).unwrap();
    assert_eq!(ranges.len(), 3);

    let mut range_roots = Vec::new();
    for range in ranges {
        let mut reader = ColdStorageReader::open(&vault, "job", "vault", range)
            .await
            .unwrap();
        let body = reader.read().await.unwrap();
        assert_eq!(body.len() as u64, range.len());

        let mut hasher = TreeHasher::new();
        hasher.update(&body);
        assert!(hasher.matches_hex(reader.service_checksum().unwrap()));
        range_roots.push(hasher.root().unwrap());
    }

    let mut whole = TreeHasher::new();
    whole.update(&data);
    assert_eq!(TreeHasher::combine(&range_roots), whole.root());
}

#[tokio::test]
async fn test_independent_workers_share_one_upload() {
    let data = seeded_bytes(11, 3 * 64 * 1024 + 100);
    let store = Arc::new(RecordingMultipart::new());
    let client: Arc<dyn MultipartClient> = store.clone();

    let coordinator = ResumableMultipartUploader::create(client.clone(), "bucket", "archive")
        .await
        .unwrap();
    let upload_id = coordinator.upload_id().to_string();
    drop(coordinator);

    // Each worker owns one part number and never sees the others' bytes.
    let pieces: Vec<Bytes> = data.chunks(64 * 1024).map(|c| data.slice_ref(c)).collect();
    let mut handles = Vec::new();
    for (index, piece) in pieces.into_iter().enumerate().rev() {
        let client = client.clone();
        let upload_id = upload_id.clone();
        handles.push(tokio::spawn(async move {
            let mut worker = ResumableMultipartUploader::open(
                client,
                "bucket",
                "archive",
                Some(upload_id),
                Some(index as u32 + 1),
            )
            .await
            .unwrap();
            worker.upload_part(piece).await.unwrap()
        }));
    }

    let mut finalizer =
        ResumableMultipartUploader::open(client, "bucket", "archive", Some(upload_id), Some(1))
            .await
            .unwrap();
    for handle in handles {
        let part = handle.await.unwrap();
        finalizer
            .include_part(part.part_number, part.etag, part.checksum_sha256)
            .unwrap();
    }
    finalizer.complete_upload().await.unwrap();

    let object = store.inner.object("bucket", "archive").await.unwrap();
    assert_eq!(sha256_hash(&object), sha256_hash(&data));

    let completions = store.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].0, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_completion_checksum_covers_parts_in_order() {
    let store = Arc::new(RecordingMultipart::new());
    let mut uploader = ResumableMultipartUploader::create(store.clone(), "bucket", "key")
        .await
        .unwrap();
    let parts = [seeded_bytes(1, 1000), seeded_bytes(2, 1000)];
    for part in &parts {
        uploader.upload_part(part.clone()).await.unwrap();
    }
    let checksum = uploader.complete_upload().await.unwrap();

    let mut concat = Vec::new();
    for part in &parts {
        concat.extend_from_slice(ContentHash::compute(part).as_bytes());
    }
    assert_eq!(checksum, ContentHash::compute(&concat));
    assert_eq!(store.completions()[0].1, checksum);
}

#[tokio::test]
async fn test_failed_part_upload_is_upstream_error() {
    let store = Arc::new(MemoryMultipart::new());
    store.fail_part(1).await;
    let mut uploader = ResumableMultipartUploader::create(store, "bucket", "key")
        .await
        .unwrap();
    assert!(matches!(
        uploader.upload_part(Bytes::from_static(b"data")).await,
        Err(StorageError::Upstream(_))
    ));
}

#[tokio::test]
async fn test_broken_stream_surfaces_error_and_consumes_reader() {
    let mut reader = ColdStorageReader::open(
        &BrokenStreamVault,
        "job",
        "vault",
        vaultlift_core::ByteRange::new(0, 99).unwrap(),
    )
    .await
    .unwrap();
    assert!(matches!(
        reader.read().await,
        Err(StorageError::Upstream(_))
    ));
    assert!(matches!(
        reader.read().await,
        Err(StorageError::AccessViolation { .. })
    ));
}
