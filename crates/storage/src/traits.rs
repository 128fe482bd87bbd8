//! Collaborator interfaces for the vault service and the object store.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use vaultlift_core::{ByteRange, ContentHash, PartDescriptor};

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Body and checksum of a job output range.
pub struct JobOutput {
    /// Range bytes, streamed.
    pub body: ByteStream,
    /// Hex tree hash reported by the service. Only present for ranges the
    /// service can verify (megabyte aligned).
    pub checksum: Option<String>,
}

impl std::fmt::Debug for JobOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOutput")
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

/// Read access to the output of a completed vault retrieval job.
#[async_trait]
pub trait VaultClient: Send + Sync + 'static {
    /// Request a byte range of a job's output.
    async fn get_job_output(
        &self,
        vault_name: &str,
        job_id: &str,
        range: ByteRange,
    ) -> StorageResult<JobOutput>;
}

/// Multipart upload primitives of the destination object store.
///
/// Uploads always carry SHA-256 checksums so the store can verify each part
/// and the assembled object.
#[async_trait]
pub trait MultipartClient: Send + Sync + 'static {
    /// Start a multipart upload and return its upload id.
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StorageResult<String>;

    /// Upload one part and return the store's ETag for it.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
        checksum: &ContentHash,
    ) -> StorageResult<String>;

    /// Assemble the parts, which must be ordered by part number.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartDescriptor],
        checksum: &ContentHash,
    ) -> StorageResult<()>;
}
