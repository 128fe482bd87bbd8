//! Moving vault ranges into multipart uploads.
//!
//! Single-chunk mode reads one range, verifies its tree hash against the
//! vault and uploads it as one part. Whole-object mode streams a range as
//! fixed-size sub-chunks: hashing stays in download order on the calling
//! task while a small worker pool uploads the sub-chunks.

use crate::error::{TransferError, TransferResult};
use crate::metrics;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, instrument};
use vaultlift_core::config::TransferConfig;
use vaultlift_core::tree_hash::DEFAULT_SEGMENT_SIZE;
use vaultlift_core::{ByteRange, Chunk, PartDescriptor, ResumePoint, TreeHasher};
use vaultlift_storage::stream::rechunk;
use vaultlift_storage::{
    ColdStorageReader, MultipartClient, PartUpload, ResumableMultipartUploader, StorageResult,
    VaultClient,
};

/// Shown in place of a checksum the vault did not report.
const NO_CHECKSUM: &str = "<none>";

/// Shown in place of a tree hash that was never computed.
const NOT_COMPUTED: &str = "<not computed>";

fn mismatch(expected: Option<&str>, actual: String) -> TransferError {
    metrics::CHECKSUM_MISMATCHES.inc();
    let expected = expected.unwrap_or(NO_CHECKSUM).to_string();
    error!(expected = %expected, actual = %actual, "tree hash mismatch");
    TransferError::ChecksumMismatch { expected, actual }
}

/// Tunables for a facilitator.
#[derive(Clone, Debug)]
pub struct TransferOptions {
    pub ignore_vault_checksum: bool,
    pub sub_chunk_size: usize,
    pub upload_concurrency: usize,
    pub tree_hash_segment_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            ignore_vault_checksum: false,
            sub_chunk_size: vaultlift_core::DEFAULT_SUB_CHUNK_SIZE,
            upload_concurrency: 2,
            tree_hash_segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

impl From<&TransferConfig> for TransferOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            ignore_vault_checksum: config.ignore_vault_checksum,
            sub_chunk_size: config.sub_chunk_size,
            upload_concurrency: config.upload_concurrency,
            tree_hash_segment_size: config.tree_hash_segment_size,
        }
    }
}

/// A range of a vault job's output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRange {
    pub job_id: String,
    pub vault_name: String,
    pub range: ByteRange,
}

/// Where a single part goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartTarget {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub part_number: u32,
}

/// Composes the reader, tree hash and uploader.
pub struct TransferFacilitator {
    vault: Arc<dyn VaultClient>,
    multipart: Arc<dyn MultipartClient>,
    options: TransferOptions,
}

impl TransferFacilitator {
    pub fn new(
        vault: Arc<dyn VaultClient>,
        multipart: Arc<dyn MultipartClient>,
        options: TransferOptions,
    ) -> Self {
        Self {
            vault,
            multipart,
            options,
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn multipart(&self) -> &Arc<dyn MultipartClient> {
        &self.multipart
    }

    fn hasher(&self) -> TreeHasher {
        TreeHasher::with_segment_size(self.options.tree_hash_segment_size)
    }

    /// Compare a computed tree hash with the vault's. A missing vault
    /// checksum never matches.
    fn verify(&self, hasher: &TreeHasher, expected: Option<&str>) -> TransferResult<String> {
        let actual = hasher.hex_digest();
        match expected {
            Some(expected) if hasher.matches_hex(expected) => Ok(actual),
            expected => Err(mismatch(expected, actual)),
        }
    }

    fn resumed_uploader(&self, target: &PartTarget) -> ResumableMultipartUploader {
        ResumableMultipartUploader::resume(
            Arc::clone(&self.multipart),
            &target.bucket,
            &target.key,
            ResumePoint {
                upload_id: target.upload_id.clone(),
                next_part_number: target.part_number,
            },
        )
    }

    /// Read one range, verify it and upload it as `target.part_number`.
    ///
    /// When verification ran, the returned descriptor carries the range's
    /// tree hash.
    #[instrument(
        skip(self, source, target),
        fields(job_id = %source.job_id, range = %source.range, upload_id = %target.upload_id, part_number = target.part_number)
    )]
    pub async fn transfer_chunk(
        &self,
        source: &JobRange,
        target: &PartTarget,
    ) -> TransferResult<PartDescriptor> {
        let mut reader = ColdStorageReader::open(
            self.vault.as_ref(),
            &source.job_id,
            &source.vault_name,
            source.range,
        )
        .await?;
        let data = reader.read().await?;

        let tree_checksum = if self.options.ignore_vault_checksum {
            None
        } else {
            let mut hasher = self.hasher();
            hasher.update(&data);
            Some(self.verify(&hasher, reader.service_checksum())?)
        };

        let size = data.len() as u64;
        let started = Instant::now();
        let part = self.resumed_uploader(target).upload_part(data).await?;
        metrics::PART_UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());
        metrics::PARTS_UPLOADED.inc();
        metrics::BYTES_TRANSFERRED.inc_by(size);
        info!(size, "transferred chunk");

        Ok(match tree_checksum {
            Some(tree_checksum) => part.with_tree_checksum(tree_checksum),
            None => part,
        })
    }

    /// Read one inventory range, trim it to whole records and upload it as
    /// `target.part_number`.
    ///
    /// A range that holds no record start of its own trims to nothing. No
    /// part is sent for it and `None` is returned; the caller marks the number
    /// with [`ResumableMultipartUploader::skip_part`].
    ///
    /// Inventory ranges overlap, so the vault checksum of a range says nothing
    /// about the trimmed bytes and is not checked.
    #[instrument(
        skip(self, source, target),
        fields(job_id = %source.job_id, range = %source.range, part_number = target.part_number)
    )]
    pub async fn transfer_inventory_chunk(
        &self,
        source: &JobRange,
        chunk: Chunk,
        max_record_size: usize,
        target: &PartTarget,
    ) -> TransferResult<Option<PartDescriptor>> {
        let mut reader = ColdStorageReader::open(
            self.vault.as_ref(),
            &source.job_id,
            &source.vault_name,
            source.range,
        )
        .await?;
        let data = reader.read().await?;
        let records = vaultlift_core::trim_record_boundaries(
            data,
            chunk.is_first,
            chunk.is_last,
            max_record_size,
        )?;

        if records.is_empty() {
            debug!("inventory chunk holds no records of its own");
            return Ok(None);
        }

        let size = records.len() as u64;
        let part = self.resumed_uploader(target).upload_part(records).await?;
        metrics::PARTS_UPLOADED.inc();
        metrics::BYTES_TRANSFERRED.inc_by(size);
        debug!(size, "transferred inventory chunk");
        Ok(Some(part))
    }

    /// Stream a whole range through `uploader` with bounded upload fan-out.
    ///
    /// Sub-chunks are hashed in download order and handed to
    /// `upload_concurrency` workers; submission waits while the workers are
    /// busy. After every upload finished the tree hash is compared with the
    /// vault's. On success the parts are included in `uploader` and returned
    /// in completion order, which is not part-number order.
    #[instrument(
        skip(self, source, uploader),
        fields(job_id = %source.job_id, range = %source.range, upload_id = %uploader.upload_id())
    )]
    pub async fn transfer_object(
        &self,
        source: &JobRange,
        uploader: &mut ResumableMultipartUploader,
    ) -> TransferResult<Vec<PartDescriptor>> {
        let mut reader = ColdStorageReader::open(
            self.vault.as_ref(),
            &source.job_id,
            &source.vault_name,
            source.range,
        )
        .await?;
        let expected = reader.service_checksum().map(str::to_owned);
        if !self.options.ignore_vault_checksum && expected.is_none() {
            // Nothing to verify against; fail before uploading anything.
            return Err(mismatch(None, NOT_COMPUTED.to_string()));
        }

        let mut sub_chunks = rechunk(reader.stream()?, self.options.sub_chunk_size);
        let mut hasher = self.hasher();
        let mut pool = UploadPool::start(self.options.upload_concurrency);
        let mut parts = Vec::new();

        while let Some(piece) = sub_chunks.next().await {
            let piece = piece?;
            hasher.update(&piece);
            let upload = uploader.prepare_part(piece)?;
            debug!(part_number = upload.part_number(), "submitting part");
            pool.submit(upload, &mut parts).await?;
        }
        pool.finish(&mut parts).await?;

        if !self.options.ignore_vault_checksum {
            self.verify(&hasher, expected.as_deref())?;
        }

        for part in &parts {
            uploader.include(part.clone())?;
        }
        info!(
            parts = parts.len(),
            size = hasher.total_len(),
            "transferred object"
        );
        Ok(parts)
    }
}

/// Fixed set of upload workers fed through a bounded channel.
///
/// Only the orchestrating task touches the senders and the collected parts;
/// workers own nothing but the upload they are running.
struct UploadPool {
    jobs: mpsc::Sender<PartUpload>,
    results: mpsc::Receiver<StorageResult<PartDescriptor>>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl UploadPool {
    fn start(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let (jobs, job_rx) = mpsc::channel::<PartUpload>(1);
        let (result_tx, results) = mpsc::channel(concurrency);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = (0..concurrency)
            .map(|_| {
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                tokio::spawn(async move {
                    loop {
                        let next = job_rx.lock().await.recv().await;
                        let Some(upload) = next else { break };
                        let size = upload.len() as u64;
                        let started = Instant::now();
                        let result = upload.execute().await;
                        metrics::PART_UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());
                        if result.is_ok() {
                            metrics::PARTS_UPLOADED.inc();
                            metrics::BYTES_TRANSFERRED.inc_by(size);
                        }
                        if result_tx.send(result).await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        Self {
            jobs,
            results,
            workers,
        }
    }

    /// Queue `upload`, collecting finished parts while the queue is full.
    async fn submit(
        &mut self,
        upload: PartUpload,
        parts: &mut Vec<PartDescriptor>,
    ) -> TransferResult<()> {
        let permit = loop {
            tokio::select! {
                permit = self.jobs.reserve() => {
                    break permit.map_err(|_| TransferError::WorkerPool("all workers exited".to_string()))?;
                }
                Some(result) = self.results.recv() => parts.push(result?),
            }
        };
        permit.send(upload);
        Ok(())
    }

    /// Close the queue, collect the remaining parts and join the workers.
    async fn finish(self, parts: &mut Vec<PartDescriptor>) -> TransferResult<()> {
        let Self {
            jobs,
            mut results,
            workers,
        } = self;
        drop(jobs);
        while let Some(result) = results.recv().await {
            parts.push(result?);
        }
        for worker in workers {
            worker.await?;
        }
        Ok(())
    }
}
