//! Vault job output reads using the Glacier API.

use crate::backends::credentials::{
    DEFAULT_REGION, LazyDefaultCredentialsProvider, map_operation_error, normalize_endpoint,
};
use crate::error::{StorageError, StorageResult};
use crate::traits::{JobOutput, VaultClient};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_glacier::Client;
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::instrument;
use vaultlift_core::ByteRange;
use vaultlift_core::config::VaultConfig;

fn map_glacier_error<E>(err: aws_sdk_glacier::error::SdkError<E>, what: &str) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|raw| raw.status().as_u16());
    map_operation_error(Box::new(err), status, what)
}

/// Reads ranges of retrieval job output from the vault service.
pub struct GlacierBackend {
    client: Client,
    account_id: String,
    region: String,
}

impl std::fmt::Debug for GlacierBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlacierBackend")
            .field("account_id", &self.account_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl GlacierBackend {
    pub async fn new(config: &VaultConfig) -> StorageResult<Self> {
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let mut builder = aws_sdk_glacier::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()))
            .credentials_provider(LazyDefaultCredentialsProvider::new(region.clone()));

        if let Some(endpoint) = config.endpoint.as_deref() {
            builder = builder.endpoint_url(normalize_endpoint(endpoint));
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            account_id: config.account_id.clone(),
            region,
        })
    }
}

#[async_trait]
impl VaultClient for GlacierBackend {
    #[instrument(skip(self, range), fields(backend = "glacier", range = %range))]
    async fn get_job_output(
        &self,
        vault_name: &str,
        job_id: &str,
        range: ByteRange,
    ) -> StorageResult<JobOutput> {
        let output = self
            .client
            .get_job_output()
            .account_id(&self.account_id)
            .vault_name(vault_name)
            .job_id(job_id)
            .range(range.to_http_range())
            .send()
            .await
            .map_err(|e| map_glacier_error(e, job_id))?;

        let checksum = output.checksum().map(str::to_string);
        let body = ReaderStream::new(output.body.into_async_read())
            .map(|result| result.map_err(StorageError::Io));

        Ok(JobOutput {
            body: Box::pin(body),
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_uses_configured_account() {
        let backend = GlacierBackend::new(&VaultConfig {
            endpoint: Some("localhost:4566".to_string()),
            region: None,
            account_id: "123456789012".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(backend.account_id, "123456789012");
        assert_eq!(backend.region, "us-east-1");
    }
}
