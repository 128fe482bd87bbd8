//! Single-use reader over a range of vault job output.

use crate::error::{StorageError, StorageResult};
use crate::stream::collect_bytes;
use crate::traits::{ByteStream, VaultClient};
use bytes::Bytes;
use tracing::{debug, instrument};
use vaultlift_core::ByteRange;

enum ReaderState {
    Unread(ByteStream),
    Read,
}

/// Reads one range of a retrieval job's output, exactly once.
///
/// The range is requested when the reader is opened, so the service checksum
/// is available before the body is consumed. The body is a network stream; a
/// second read fails with [`StorageError::AccessViolation`] instead of
/// silently yielding nothing.
pub struct ColdStorageReader {
    job_id: String,
    vault_name: String,
    range: ByteRange,
    checksum: Option<String>,
    state: ReaderState,
}

impl std::fmt::Debug for ColdStorageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColdStorageReader")
            .field("job_id", &self.job_id)
            .field("vault_name", &self.vault_name)
            .field("range", &self.range)
            .field("checksum", &self.checksum)
            .field("read", &matches!(self.state, ReaderState::Read))
            .finish()
    }
}

impl ColdStorageReader {
    /// Request `range` of the output of `job_id`.
    #[instrument(skip(client, range), fields(range = %range))]
    pub async fn open(
        client: &dyn VaultClient,
        job_id: &str,
        vault_name: &str,
        range: ByteRange,
    ) -> StorageResult<Self> {
        let output = client.get_job_output(vault_name, job_id, range).await?;
        debug!(checksum = ?output.checksum, "opened job output");
        Ok(Self {
            job_id: job_id.to_string(),
            vault_name: vault_name.to_string(),
            range,
            checksum: output.checksum,
            state: ReaderState::Unread(output.body),
        })
    }

    /// Read the whole range into memory.
    pub async fn read(&mut self) -> StorageResult<Bytes> {
        let body = self.stream()?;
        collect_bytes(body).await
    }

    /// Take the body as a stream.
    pub fn stream(&mut self) -> StorageResult<ByteStream> {
        match std::mem::replace(&mut self.state, ReaderState::Read) {
            ReaderState::Unread(body) => Ok(body),
            ReaderState::Read => Err(StorageError::AccessViolation {
                job_id: self.job_id.clone(),
            }),
        }
    }

    /// Hex tree hash the service reported for this range, if any.
    pub fn service_checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }

    pub fn is_read(&self) -> bool {
        matches!(self.state, ReaderState::Read)
    }
}
