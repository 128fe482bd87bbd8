//! S3-compatible multipart upload backend using AWS SDK.

use crate::backends::credentials::{
    DEFAULT_REGION, LazyDefaultCredentialsProvider, check_credential_pair, map_operation_error,
    normalize_endpoint,
};
use crate::error::{StorageError, StorageResult};
use crate::traits::MultipartClient;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{ChecksumAlgorithm, CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use tracing::instrument;
use vaultlift_core::config::S3Config;
use vaultlift_core::{ContentHash, PartDescriptor};

fn map_s3_error<E>(err: aws_sdk_s3::error::SdkError<E>, what: &str) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|raw| raw.status().as_u16());
    map_operation_error(Box::new(err), status, what)
}

fn to_sdk_part_number(part_number: u32) -> StorageResult<i32> {
    i32::try_from(part_number)
        .map_err(|_| StorageError::InvalidPart(format!("part number {part_number} out of range")))
}

/// Multipart uploads against S3 or an S3-compatible store, with SHA-256
/// part and object checksums.
pub struct S3MultipartBackend {
    client: Client,
    /// Stored endpoint for diagnostics (normalized).
    endpoint: String,
    region: String,
}

impl std::fmt::Debug for S3MultipartBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3MultipartBackend")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3MultipartBackend {
    /// Create a new backend.
    ///
    /// `force_path_style` selects `endpoint/bucket/key` URLs, which MinIO and
    /// some S3-compatible services require.
    pub async fn new(config: &S3Config) -> StorageResult<Self> {
        check_credential_pair(&config.access_key_id, &config.secret_access_key)?;

        let resolved_region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                key_id.clone(),
                secret.clone(),
                None, // session token
                None, // expiration
                "vaultlift-config",
            );
            builder = builder.credentials_provider(credentials);
        } else {
            builder = builder
                .credentials_provider(LazyDefaultCredentialsProvider::new(resolved_region.clone()));
        }

        let normalized_endpoint = config.endpoint.as_deref().map(normalize_endpoint);
        if let Some(endpoint_url) = &normalized_endpoint {
            builder = builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let endpoint = match normalized_endpoint {
            Some(url) => url,
            None => format!("s3.{resolved_region}.amazonaws.com"),
        };

        Ok(Self {
            client: Client::from_conf(builder.build()),
            endpoint,
            region: resolved_region,
        })
    }
}

#[async_trait]
impl MultipartClient for S3MultipartBackend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StorageResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .checksum_algorithm(ChecksumAlgorithm::Sha256)
            .send()
            .await
            .map_err(|e| map_s3_error(e, bucket))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Config("S3 did not return upload_id".to_string()))
    }

    #[instrument(skip(self, data, checksum), fields(backend = "s3", size = data.len()))]
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
        checksum: &ContentHash,
    ) -> StorageResult<String> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(to_sdk_part_number(part_number)?)
            .checksum_algorithm(ChecksumAlgorithm::Sha256)
            .checksum_sha256(checksum.to_base64())
            .body(data.into())
            .send()
            .await
            .map_err(|e| map_s3_error(e, upload_id))?;

        Ok(output.e_tag().unwrap_or_default().to_string())
    }

    #[instrument(skip(self, parts, checksum), fields(backend = "s3", parts = parts.len()))]
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartDescriptor],
        checksum: &ContentHash,
    ) -> StorageResult<()> {
        let completed_parts = parts
            .iter()
            .map(|part| {
                Ok(CompletedPart::builder()
                    .part_number(to_sdk_part_number(part.part_number)?)
                    .e_tag(&part.etag)
                    .checksum_sha256(&part.checksum_sha256)
                    .build())
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .checksum_sha256(checksum.to_base64())
            .send()
            .await
            .map_err(|e| map_s3_error(e, upload_id))?;

        Ok(())
    }
}
