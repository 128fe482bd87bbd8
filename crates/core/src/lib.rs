//! Core domain types and algorithms for moving archives out of a cold-storage
//! vault into a multipart object store.
//!
//! This crate has no I/O. It defines:
//! - Byte ranges and the archive/inventory range planners
//! - Inventory record-boundary trimming
//! - The vault tree hash and the multipart composite checksum
//! - Part descriptors and upload session state
//! - Vault job results and correlation records
//! - Configuration shared by the other crates

pub mod composite;
pub mod config;
pub mod error;
pub mod hash;
pub mod job;
pub mod part;
pub mod plan;
pub mod range;
pub mod tree_hash;
pub mod trim;
pub mod upload;

pub use composite::CompositeChecksum;
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use job::{
    CompletionSignal, CorrelationRecord, CorrelationState, JobNotification, JobResult, JobStatus,
};
pub use part::{MAX_PART_NUMBER, PartDescriptor};
pub use plan::{plan_archive, plan_inventory};
pub use range::{ByteRange, Chunk};
pub use tree_hash::TreeHasher;
pub use trim::trim_record_boundaries;
pub use upload::{ResumePoint, UploadSession, UploadState};

/// Default archive range size: 1 GiB
pub const DEFAULT_ARCHIVE_CHUNK_SIZE: u64 = 1024 * 1024 * 1024;

/// Default inventory range size: 5 MiB
pub const DEFAULT_INVENTORY_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default longest inventory record: 2 KiB
pub const DEFAULT_MAX_INVENTORY_RECORD_SIZE: u64 = 2 * 1024;

/// Default part size in whole-object mode: 8 MiB
pub const DEFAULT_SUB_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Smallest part the object store accepts, except for the last: 5 MiB
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;
