//! Configuration types shared across crates.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `VAULTLIFT_TRANSFER__SUB_CHUNK_SIZE`.
pub const ENV_PREFIX: &str = "VAULTLIFT_";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    /// Layer an optional TOML file under `VAULTLIFT_` environment variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate configuration.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let config: AppConfig = Self::figment(path)
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate().map_err(crate::Error::Config)?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.transfer.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

/// Chunking and verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Archive range size in bytes. Must be a power of two.
    #[serde(default = "default_archive_chunk_size")]
    pub archive_chunk_size: u64,
    /// Inventory range size in bytes.
    #[serde(default = "default_inventory_chunk_size")]
    pub inventory_chunk_size: u64,
    /// Longest inventory record, newline included.
    #[serde(default = "default_max_inventory_record_size")]
    pub max_inventory_record_size: u64,
    /// Part size used when a whole object is streamed through one facilitator.
    #[serde(default = "default_sub_chunk_size")]
    pub sub_chunk_size: usize,
    /// Uploads allowed in flight in whole-object mode.
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    /// Tree-hash segment size in bytes.
    #[serde(default = "default_tree_hash_segment_size")]
    pub tree_hash_segment_size: usize,
    /// Skip comparison with the vault-reported checksum.
    #[serde(default)]
    pub ignore_vault_checksum: bool,
}

fn default_archive_chunk_size() -> u64 {
    crate::DEFAULT_ARCHIVE_CHUNK_SIZE
}

fn default_inventory_chunk_size() -> u64 {
    crate::DEFAULT_INVENTORY_CHUNK_SIZE
}

fn default_max_inventory_record_size() -> u64 {
    crate::DEFAULT_MAX_INVENTORY_RECORD_SIZE
}

fn default_sub_chunk_size() -> usize {
    crate::DEFAULT_SUB_CHUNK_SIZE
}

fn default_upload_concurrency() -> usize {
    2
}

fn default_tree_hash_segment_size() -> usize {
    crate::tree_hash::DEFAULT_SEGMENT_SIZE
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            archive_chunk_size: default_archive_chunk_size(),
            inventory_chunk_size: default_inventory_chunk_size(),
            max_inventory_record_size: default_max_inventory_record_size(),
            sub_chunk_size: default_sub_chunk_size(),
            upload_concurrency: default_upload_concurrency(),
            tree_hash_segment_size: default_tree_hash_segment_size(),
            ignore_vault_checksum: false,
        }
    }
}

impl TransferConfig {
    /// Validate chunking invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !self.archive_chunk_size.is_power_of_two() {
            return Err(format!(
                "archive_chunk_size {} must be a power of two",
                self.archive_chunk_size
            ));
        }
        if self.inventory_chunk_size <= self.max_inventory_record_size {
            return Err(format!(
                "inventory_chunk_size {} must be larger than max_inventory_record_size {}",
                self.inventory_chunk_size, self.max_inventory_record_size
            ));
        }
        if self.sub_chunk_size == 0 {
            return Err("sub_chunk_size must be greater than zero".to_string());
        }
        if self.upload_concurrency == 0 {
            return Err("upload_concurrency must be at least 1".to_string());
        }
        if self.tree_hash_segment_size == 0 {
            return Err("tree_hash_segment_size must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Client settings for both storage services.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub vault: VaultConfig,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.s3.validate()
    }
}

/// S3-compatible object store client settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct S3Config {
    /// Optional endpoint URL (for MinIO, etc.).
    pub endpoint: Option<String>,
    /// AWS region.
    pub region: Option<String>,
    /// AWS access key ID. Falls back to the default credential chain if not set.
    pub access_key_id: Option<String>,
    /// AWS secret access key. Falls back to the default credential chain if not set.
    pub secret_access_key: Option<String>,
    /// Force path-style URLs. Required for MinIO and some S3-compatible services.
    #[serde(default)]
    pub force_path_style: bool,
}

impl S3Config {
    /// Credentials must be given as a pair or not at all.
    pub fn validate(&self) -> Result<(), String> {
        match (self.access_key_id.as_ref(), self.secret_access_key.as_ref()) {
            (Some(_), Some(_)) | (None, None) => Ok(()),
            _ => Err(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ),
        }
    }
}

/// Vault service client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultConfig {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Account owning the vaults; `-` means the caller's account.
    #[serde(default = "default_account_id")]
    pub account_id: String,
}

fn default_account_id() -> String {
    "-".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: None,
            account_id: default_account_id(),
        }
    }
}

/// Correlation record and part ledger store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// SQLite database path.
    #[serde(default = "default_metadata_path")]
    pub path: PathBuf,
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/vaultlift.db")
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

/// Workflow engine client settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub endpoint: Option<String>,
    pub region: Option<String>,
}
