use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;
use vaultlift_core::{ByteRange, ContentHash, PartDescriptor};
use vaultlift_storage::error::{StorageError, StorageResult};
use vaultlift_storage::traits::{JobOutput, MultipartClient, VaultClient};
use vaultlift_storage::MemoryMultipart;

/// Vault whose bodies fail after the first piece, like a dropped connection.
#[allow(dead_code)]
pub struct BrokenStreamVault;

#[async_trait]
impl VaultClient for BrokenStreamVault {
    async fn get_job_output(
        &self,
        _vault_name: &str,
        _job_id: &str,
        _range: ByteRange,
    ) -> StorageResult<JobOutput> {
        let pieces: Vec<StorageResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StorageError::Upstream("connection reset".into())),
        ];
        Ok(JobOutput {
            body: Box::pin(futures::stream::iter(pieces)),
            checksum: None,
        })
    }
}

/// Multipart client that records the completion request before delegating.
#[allow(dead_code)]
pub struct RecordingMultipart {
    pub inner: MemoryMultipart,
    pub completions: Mutex<Vec<(Vec<u32>, ContentHash)>>,
}

#[allow(dead_code)]
impl RecordingMultipart {
    pub fn new() -> Self {
        Self {
            inner: MemoryMultipart::new(),
            completions: Mutex::new(Vec::new()),
        }
    }

    pub fn completions(&self) -> Vec<(Vec<u32>, ContentHash)> {
        self.completions.lock().unwrap().clone()
    }
}

#[async_trait]
impl MultipartClient for RecordingMultipart {
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StorageResult<String> {
        self.inner.create_multipart_upload(bucket, key).await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
        checksum: &ContentHash,
    ) -> StorageResult<String> {
        self.inner
            .upload_part(bucket, key, upload_id, part_number, data, checksum)
            .await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartDescriptor],
        checksum: &ContentHash,
    ) -> StorageResult<()> {
        self.completions.lock().unwrap().push((
            parts.iter().map(|p| p.part_number).collect(),
            *checksum,
        ));
        self.inner
            .complete_multipart_upload(bucket, key, upload_id, parts, checksum)
            .await
    }
}
