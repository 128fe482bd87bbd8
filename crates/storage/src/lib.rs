//! Vault and object store access for vaultlift.
//!
//! This crate provides:
//! - Collaborator traits for vault job output and multipart uploads
//! - The single-use [`ColdStorageReader`]
//! - The [`ResumableMultipartUploader`]
//! - Backends: Glacier, S3-compatible, and in-memory (behind `test-util`)

pub mod backends;
pub mod error;
pub mod reader;
pub mod stream;
pub mod traits;
pub mod upload;

pub use backends::glacier::GlacierBackend;
#[cfg(any(test, feature = "test-util"))]
pub use backends::memory::{MemoryMultipart, MemoryVault};
pub use backends::s3::S3MultipartBackend;
pub use error::{StorageError, StorageResult};
pub use reader::ColdStorageReader;
pub use traits::{ByteStream, JobOutput, MultipartClient, VaultClient};
pub use upload::{PartUpload, ResumableMultipartUploader};

use std::sync::Arc;
use vaultlift_core::config::{S3Config, StorageConfig, VaultConfig};

/// Create a vault client from configuration.
pub async fn vault_from_config(config: &VaultConfig) -> StorageResult<Arc<dyn VaultClient>> {
    let backend = GlacierBackend::new(config).await?;
    Ok(Arc::new(backend))
}

/// Create a multipart client from configuration.
pub async fn multipart_from_config(config: &S3Config) -> StorageResult<Arc<dyn MultipartClient>> {
    config.validate().map_err(StorageError::Config)?;
    let backend = S3MultipartBackend::new(config).await?;
    Ok(Arc::new(backend))
}

/// Create both clients from configuration.
pub async fn from_config(
    config: &StorageConfig,
) -> StorageResult<(Arc<dyn VaultClient>, Arc<dyn MultipartClient>)> {
    config.validate().map_err(StorageError::Config)?;
    let vault = vault_from_config(&config.vault).await?;
    let multipart = multipart_from_config(&config.s3).await?;
    Ok((vault, multipart))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_ok() {
        let config = StorageConfig {
            s3: S3Config {
                endpoint: Some("minio:9000".to_string()),
                region: Some("us-east-1".to_string()),
                force_path_style: true,
                ..Default::default()
            },
            vault: VaultConfig::default(),
        };

        let (vault, multipart) = from_config(&config).await.unwrap();
        drop(vault);
        drop(multipart);
    }

    #[tokio::test]
    async fn from_config_rejects_partial_credentials() {
        let config = StorageConfig {
            s3: S3Config {
                access_key_id: Some("access".to_string()),
                ..Default::default()
            },
            vault: VaultConfig::default(),
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
