//! Resumable multipart uploads with composite checksum verification.

use crate::error::{StorageError, StorageResult};
use crate::traits::MultipartClient;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use vaultlift_core::{CompositeChecksum, ContentHash, PartDescriptor, ResumePoint, UploadSession};

/// A part whose number is already allocated but which has not been sent.
///
/// Owns everything it needs, so it can be moved onto a worker task.
pub struct PartUpload {
    client: Arc<dyn MultipartClient>,
    bucket: String,
    key: String,
    upload_id: String,
    part_number: u32,
    data: Bytes,
}

impl PartUpload {
    pub fn part_number(&self) -> u32 {
        self.part_number
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Send the part and describe the result.
    #[instrument(skip(self), fields(upload_id = %self.upload_id, part_number = self.part_number, size = self.data.len()))]
    pub async fn execute(self) -> StorageResult<PartDescriptor> {
        let checksum = CompositeChecksum::part_checksum(&self.data);
        let etag = self
            .client
            .upload_part(
                &self.bucket,
                &self.key,
                &self.upload_id,
                self.part_number,
                self.data,
                &checksum,
            )
            .await?;
        debug!(etag = %etag, "uploaded part");
        Ok(PartDescriptor::new(self.part_number, etag, &checksum))
    }
}

/// Multipart upload that can be resumed from its upload id and shared by
/// several workers.
///
/// Part numbers are handed out in submission order. Parts uploaded by other
/// processes are registered with [`include_part`](Self::include_part); on
/// completion every number from 1 to the highest must be present.
pub struct ResumableMultipartUploader {
    client: Arc<dyn MultipartClient>,
    session: UploadSession,
}

impl ResumableMultipartUploader {
    /// Start a new multipart upload.
    #[instrument(skip(client))]
    pub async fn create(
        client: Arc<dyn MultipartClient>,
        bucket: &str,
        key: &str,
    ) -> StorageResult<Self> {
        let upload_id = client.create_multipart_upload(bucket, key).await?;
        info!(upload_id = %upload_id, "created multipart upload");
        Ok(Self {
            client,
            session: UploadSession::new(bucket, key, upload_id),
        })
    }

    /// Attach to an existing upload.
    pub fn resume(
        client: Arc<dyn MultipartClient>,
        bucket: &str,
        key: &str,
        point: ResumePoint,
    ) -> Self {
        debug!(
            upload_id = %point.upload_id,
            next_part_number = point.next_part_number,
            "resuming multipart upload"
        );
        Self {
            client,
            session: UploadSession::resume(bucket, key, point.upload_id, point.next_part_number),
        }
    }

    /// Resume when both `upload_id` and `next_part_number` are given, create
    /// when neither is. Anything else is [`StorageError::UnresumableUpload`].
    pub async fn open(
        client: Arc<dyn MultipartClient>,
        bucket: &str,
        key: &str,
        upload_id: Option<String>,
        next_part_number: Option<u32>,
    ) -> StorageResult<Self> {
        match (upload_id, next_part_number) {
            (Some(upload_id), Some(next_part_number)) => Ok(Self::resume(
                client,
                bucket,
                key,
                ResumePoint {
                    upload_id,
                    next_part_number,
                },
            )),
            (None, None) => Self::create(client, bucket, key).await,
            (upload_id, next_part_number) => Err(StorageError::UnresumableUpload {
                has_upload_id: upload_id.is_some(),
                has_part_number: next_part_number.is_some(),
            }),
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.session.upload_id
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn resume_point(&self) -> ResumePoint {
        self.session.resume_point()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.session.is_completed() {
            return Err(StorageError::AlreadyCompleted {
                upload_id: self.session.upload_id.clone(),
            });
        }
        Ok(())
    }

    /// Allocate the next part number for `data` without sending it.
    ///
    /// The caller sends the part with [`PartUpload::execute`] and registers
    /// the returned descriptor with [`include`](Self::include).
    pub fn prepare_part(&mut self, data: Bytes) -> StorageResult<PartUpload> {
        self.ensure_open()?;
        if data.is_empty() {
            return Err(StorageError::InvalidPart("part has no data".to_string()));
        }
        Ok(PartUpload {
            client: Arc::clone(&self.client),
            bucket: self.session.bucket.clone(),
            key: self.session.key.clone(),
            upload_id: self.session.upload_id.clone(),
            part_number: self.session.allocate_part_number()?,
            data,
        })
    }

    /// Upload `data` as the next part.
    pub async fn upload_part(&mut self, data: Bytes) -> StorageResult<PartDescriptor> {
        let part = self.prepare_part(data)?.execute().await?;
        self.include(part.clone())?;
        Ok(part)
    }

    /// Register a part uploaded elsewhere.
    pub fn include_part(
        &mut self,
        part_number: u32,
        etag: impl Into<String>,
        checksum_sha256: impl Into<String>,
    ) -> StorageResult<()> {
        self.include(PartDescriptor {
            part_number,
            etag: etag.into(),
            checksum_sha256: checksum_sha256.into(),
            tree_checksum: None,
        })
    }

    /// Record that `part_number` was allocated to a range with no data, so it
    /// does not count as a gap at completion.
    pub fn skip_part(&mut self, part_number: u32) -> StorageResult<()> {
        self.ensure_open()?;
        self.session.skip_part(part_number)?;
        debug!(part_number, "skipping empty part");
        Ok(())
    }

    /// Register a part descriptor.
    pub fn include(&mut self, part: PartDescriptor) -> StorageResult<()> {
        self.ensure_open()?;
        self.session.record_part(part)?;
        Ok(())
    }

    /// Finalize the upload and return the composite checksum the store
    /// verified.
    #[instrument(skip(self), fields(upload_id = %self.session.upload_id, parts = self.session.part_count()))]
    pub async fn complete_upload(&mut self) -> StorageResult<ContentHash> {
        self.ensure_open()?;
        if self.session.part_count() == 0 {
            return Err(StorageError::InvalidPart("upload has no parts".to_string()));
        }
        let missing = self.session.missing_parts();
        if !missing.is_empty() {
            return Err(StorageError::IncompleteUpload {
                upload_id: self.session.upload_id.clone(),
                missing,
            });
        }

        let checksum = self.session.composite_checksum()?.digest()?;
        let parts: Vec<PartDescriptor> = self.session.parts().cloned().collect();
        self.client
            .complete_multipart_upload(
                &self.session.bucket,
                &self.session.key,
                &self.session.upload_id,
                &parts,
                &checksum,
            )
            .await?;

        self.session.mark_completed();
        info!(checksum = %checksum.to_base64(), "completed multipart upload");
        Ok(checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryMultipart;
    use vaultlift_core::MAX_PART_NUMBER;

    fn store() -> Arc<MemoryMultipart> {
        Arc::new(MemoryMultipart::new())
    }

    #[tokio::test]
    async fn test_upload_and_complete() {
        let store = store();
        let mut uploader = ResumableMultipartUploader::create(store.clone(), "b", "k")
            .await
            .unwrap();

        let first = uploader
            .upload_part(Bytes::from_static(b"hello "))
            .await
            .unwrap();
        let second = uploader
            .upload_part(Bytes::from_static(b"world"))
            .await
            .unwrap();
        assert_eq!(first.part_number, 1);
        assert_eq!(second.part_number, 2);
        assert_eq!(
            first.checksum().unwrap(),
            ContentHash::compute(b"hello ")
        );

        let checksum = uploader.complete_upload().await.unwrap();
        let mut composite = CompositeChecksum::new();
        composite.include(ContentHash::compute(b"hello "));
        composite.include(ContentHash::compute(b"world"));
        assert_eq!(checksum, composite.digest().unwrap());
        assert_eq!(
            store.object("b", "k").await.unwrap(),
            Bytes::from_static(b"hello world")
        );
    }

    #[tokio::test]
    async fn test_mutations_after_completion_fail() {
        let mut uploader = ResumableMultipartUploader::create(store(), "b", "k")
            .await
            .unwrap();
        let part = uploader
            .upload_part(Bytes::from_static(b"only"))
            .await
            .unwrap();
        uploader.complete_upload().await.unwrap();

        assert!(matches!(
            uploader.upload_part(Bytes::from_static(b"more")).await,
            Err(StorageError::AlreadyCompleted { .. })
        ));
        assert!(matches!(
            uploader.include_part(2, "etag", part.checksum_sha256.clone()),
            Err(StorageError::AlreadyCompleted { .. })
        ));
        assert!(matches!(
            uploader.complete_upload().await,
            Err(StorageError::AlreadyCompleted { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_requires_both_resume_parameters() {
        let result =
            ResumableMultipartUploader::open(store(), "b", "k", Some("upload-1".into()), None)
                .await;
        assert!(matches!(
            result,
            Err(StorageError::UnresumableUpload {
                has_upload_id: true,
                has_part_number: false
            })
        ));

        let result = ResumableMultipartUploader::open(store(), "b", "k", None, Some(3)).await;
        assert!(matches!(
            result,
            Err(StorageError::UnresumableUpload {
                has_upload_id: false,
                has_part_number: true
            })
        ));

        let fresh = ResumableMultipartUploader::open(store(), "b", "k", None, None)
            .await
            .unwrap();
        assert_eq!(fresh.resume_point().next_part_number, 1);
    }

    #[tokio::test]
    async fn test_resume_continues_numbering() {
        let store = store();
        let mut first = ResumableMultipartUploader::create(store.clone(), "b", "k")
            .await
            .unwrap();
        let part_one = first.upload_part(Bytes::from_static(b"one ")).await.unwrap();
        let point = first.resume_point();
        drop(first);

        let mut resumed = ResumableMultipartUploader::open(
            store.clone(),
            "b",
            "k",
            Some(point.upload_id),
            Some(point.next_part_number),
        )
        .await
        .unwrap();
        let part_two = resumed
            .upload_part(Bytes::from_static(b"two"))
            .await
            .unwrap();
        assert_eq!(part_two.part_number, 2);

        resumed
            .include_part(part_one.part_number, part_one.etag, part_one.checksum_sha256)
            .unwrap();
        resumed.complete_upload().await.unwrap();
        assert_eq!(
            store.object("b", "k").await.unwrap(),
            Bytes::from_static(b"one two")
        );
    }

    #[tokio::test]
    async fn test_complete_requires_every_part() {
        let store = store();
        let mut uploader = ResumableMultipartUploader::create(store.clone(), "b", "k")
            .await
            .unwrap();
        let skipped = uploader.prepare_part(Bytes::from_static(b"one")).unwrap();
        assert_eq!(skipped.part_number(), 1);
        uploader
            .upload_part(Bytes::from_static(b"two"))
            .await
            .unwrap();

        match uploader.complete_upload().await {
            Err(StorageError::IncompleteUpload { missing, .. }) => assert_eq!(missing, vec![1]),
            other => panic!("expected incomplete upload, got {other:?}"),
        }

        let part = skipped.execute().await.unwrap();
        uploader.include(part).unwrap();
        uploader.complete_upload().await.unwrap();
    }

    #[tokio::test]
    async fn test_skipped_part_is_not_a_gap() {
        let store = store();
        let mut uploader = ResumableMultipartUploader::create(store.clone(), "b", "k")
            .await
            .unwrap();
        uploader
            .upload_part(Bytes::from_static(b"one "))
            .await
            .unwrap();
        uploader.skip_part(2).unwrap();
        let third = uploader.upload_part(Bytes::from_static(b"three")).await.unwrap();
        assert_eq!(third.part_number, 3);

        let checksum = uploader.complete_upload().await.unwrap();
        let mut composite = CompositeChecksum::new();
        composite.include(ContentHash::compute(b"one "));
        composite.include(ContentHash::compute(b"three"));
        assert_eq!(checksum, composite.digest().unwrap());
        assert_eq!(
            store.object("b", "k").await.unwrap(),
            Bytes::from_static(b"one three")
        );
    }

    #[tokio::test]
    async fn test_part_numbers_beyond_limit_are_rejected() {
        let store = store();
        let mut uploader = ResumableMultipartUploader::create(store.clone(), "b", "k")
            .await
            .unwrap();
        let checksum = ContentHash::compute(b"x").to_base64();
        assert!(matches!(
            uploader.include_part(u32::MAX, "etag", checksum.clone()),
            Err(StorageError::Core(_))
        ));
        assert_eq!(uploader.resume_point().next_part_number, 1);

        let mut resumed = ResumableMultipartUploader::resume(
            store,
            "b",
            "k",
            ResumePoint {
                upload_id: uploader.upload_id().to_string(),
                next_part_number: MAX_PART_NUMBER + 1,
            },
        );
        assert!(resumed.prepare_part(Bytes::from_static(b"late")).is_err());
    }

    #[tokio::test]
    async fn test_rejects_empty_upload_and_part() {
        let mut uploader = ResumableMultipartUploader::create(store(), "b", "k")
            .await
            .unwrap();
        assert!(matches!(
            uploader.prepare_part(Bytes::new()),
            Err(StorageError::InvalidPart(_))
        ));
        assert!(matches!(
            uploader.complete_upload().await,
            Err(StorageError::InvalidPart(_))
        ));
    }
}
