//! In-process vault and multipart store.
//!
//! Both behave like their service counterparts closely enough to exercise
//! the transfer paths end to end: the vault reports tree-hash checksums for
//! the ranges it serves, and the store verifies part and composite checksums
//! when parts are uploaded and when the upload is completed.

use crate::error::{StorageError, StorageResult};
use crate::traits::{JobOutput, MultipartClient, VaultClient};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use vaultlift_core::{ByteRange, CompositeChecksum, ContentHash, PartDescriptor, TreeHasher};

#[derive(Clone)]
struct StoredJob {
    data: Bytes,
    checksum_override: Option<Option<String>>,
}

/// Vault whose job outputs live in memory.
pub struct MemoryVault {
    jobs: Mutex<HashMap<(String, String), StoredJob>>,
    piece_size: usize,
    reads: AtomicUsize,
}

impl MemoryVault {
    /// Bodies are streamed in 64 KiB pieces.
    pub fn new() -> Self {
        Self::with_piece_size(64 * 1024)
    }

    /// Stream bodies in pieces of `piece_size` bytes.
    pub fn with_piece_size(piece_size: usize) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            piece_size: piece_size.max(1),
            reads: AtomicUsize::new(0),
        }
    }

    /// Make `data` the output of `job_id` in `vault_name`.
    pub async fn insert_job(&self, vault_name: &str, job_id: &str, data: Bytes) {
        self.jobs.lock().await.insert(
            (vault_name.to_string(), job_id.to_string()),
            StoredJob {
                data,
                checksum_override: None,
            },
        );
    }

    /// Report `checksum` for every range of the job instead of the real tree
    /// hash. `None` reports no checksum at all.
    pub async fn override_checksum(
        &self,
        vault_name: &str,
        job_id: &str,
        checksum: Option<String>,
    ) {
        if let Some(job) = self
            .jobs
            .lock()
            .await
            .get_mut(&(vault_name.to_string(), job_id.to_string()))
        {
            job.checksum_override = Some(checksum);
        }
    }

    /// Number of `get_job_output` calls served.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VaultClient for MemoryVault {
    async fn get_job_output(
        &self,
        vault_name: &str,
        job_id: &str,
        range: ByteRange,
    ) -> StorageResult<JobOutput> {
        let job = self
            .jobs
            .lock()
            .await
            .get(&(vault_name.to_string(), job_id.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id} in vault {vault_name}")))?;

        if range.end() >= job.data.len() as u64 {
            return Err(StorageError::Core(vaultlift_core::Error::InvalidByteRange(
                format!("{range} is outside the {} byte job output", job.data.len()),
            )));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);

        let body = job
            .data
            .slice(range.start() as usize..=range.end() as usize);
        let checksum = match job.checksum_override {
            Some(checksum) => checksum,
            None => {
                let mut hasher = TreeHasher::new();
                hasher.update(&body);
                Some(hasher.hex_digest())
            }
        };

        let pieces: Vec<StorageResult<Bytes>> = body
            .chunks(self.piece_size)
            .map(|piece| Ok(body.slice_ref(piece)))
            .collect();

        Ok(JobOutput {
            body: Box::pin(futures::stream::iter(pieces)),
            checksum,
        })
    }
}

#[derive(Clone)]
struct StoredPart {
    etag: String,
    checksum: ContentHash,
    data: Bytes,
}

struct StoredUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, StoredPart>,
    completed: bool,
}

/// Multipart store that keeps parts and completed objects in memory.
pub struct MemoryMultipart {
    uploads: Mutex<HashMap<String, StoredUpload>>,
    objects: Mutex<HashMap<(String, String), Bytes>>,
    failing_parts: Mutex<HashSet<u32>>,
    part_delay: Option<Duration>,
    next_upload: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    part_calls: AtomicUsize,
}

impl MemoryMultipart {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(HashMap::new()),
            objects: Mutex::new(HashMap::new()),
            failing_parts: Mutex::new(HashSet::new()),
            part_delay: None,
            next_upload: AtomicUsize::new(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            part_calls: AtomicUsize::new(0),
        }
    }

    /// Hold every part upload for `delay` before storing it.
    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = Some(delay);
        self
    }

    /// Make uploads of `part_number` fail with an upstream error.
    pub async fn fail_part(&self, part_number: u32) {
        self.failing_parts.lock().await.insert(part_number);
    }

    /// Completed object bytes, if the upload for it was completed.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Part numbers stored for an upload, in order.
    pub async fn part_numbers(&self, upload_id: &str) -> Vec<u32> {
        self.uploads
            .lock()
            .await
            .get(upload_id)
            .map(|upload| upload.parts.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Highest number of part uploads observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of `upload_part` calls received, successful or not.
    pub fn part_calls(&self) -> usize {
        self.part_calls.load(Ordering::SeqCst)
    }

    async fn store_part(
        &self,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
        checksum: &ContentHash,
    ) -> StorageResult<String> {
        if let Some(delay) = self.part_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_parts.lock().await.contains(&part_number) {
            return Err(StorageError::Upstream(
                format!("injected failure for part {part_number}").into(),
            ));
        }
        if ContentHash::compute(&data) != *checksum {
            return Err(StorageError::InvalidPart(format!(
                "checksum mismatch for part {part_number}"
            )));
        }

        let mut uploads = self.uploads.lock().await;
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::NotFound(format!("upload {upload_id}")))?;
        if upload.completed {
            return Err(StorageError::NotFound(format!("upload {upload_id}")));
        }

        let etag = format!("\"{}\"", &checksum.to_hex()[..32]);
        upload.parts.insert(
            part_number,
            StoredPart {
                etag: etag.clone(),
                checksum: *checksum,
                data,
            },
        );
        Ok(etag)
    }
}

impl Default for MemoryMultipart {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MultipartClient for MemoryMultipart {
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StorageResult<String> {
        let upload_id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::SeqCst));
        self.uploads.lock().await.insert(
            upload_id.clone(),
            StoredUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
                completed: false,
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
        checksum: &ContentHash,
    ) -> StorageResult<String> {
        self.part_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let result = self.store_part(upload_id, part_number, data, checksum).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartDescriptor],
        checksum: &ContentHash,
    ) -> StorageResult<()> {
        let mut uploads = self.uploads.lock().await;
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::NotFound(format!("upload {upload_id}")))?;
        if upload.completed || upload.bucket != bucket || upload.key != key {
            return Err(StorageError::NotFound(format!("upload {upload_id}")));
        }
        if parts.is_empty() {
            return Err(StorageError::InvalidPart("no parts to complete".to_string()));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(StorageError::InvalidPart(
                "parts must be in ascending part number order".to_string(),
            ));
        }

        let mut composite = CompositeChecksum::new();
        let mut object = Vec::new();
        for part in parts {
            let stored = upload.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::InvalidPart(format!("part {} was never uploaded", part.part_number))
            })?;
            if stored.etag != part.etag || stored.checksum != part.checksum()? {
                return Err(StorageError::InvalidPart(format!(
                    "part {} does not match the uploaded part",
                    part.part_number
                )));
            }
            composite.include(stored.checksum);
            object.extend_from_slice(&stored.data);
        }
        if composite.digest()? != *checksum {
            return Err(StorageError::InvalidPart(
                "composite checksum does not match".to_string(),
            ));
        }

        upload.completed = true;
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), Bytes::from(object));
        Ok(())
    }
}
