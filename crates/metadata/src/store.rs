//! Metadata store trait and implementations.

use crate::error::MetadataResult;
use crate::repos::{CorrelationRepo, PartRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: CorrelationRepo + PartRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers; the conditional completion
            // write relies on that.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "opened sqlite metadata store");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::error::MetadataError;
    use crate::models::{CorrelationRow, PartRow, TransferKey};
    use crate::repos::CompletionOutcome;
    use std::time::Duration;
    use time::OffsetDateTime;
    use vaultlift_core::{CorrelationRecord, JobResult, PartDescriptor};

    impl SqliteStore {
        async fn fetch_correlation(&self, job_id: &str) -> MetadataResult<Option<CorrelationRow>> {
            let row = sqlx::query_as::<_, CorrelationRow>(
                "SELECT job_id, task_token, start_timestamp, finish_timestamp, job_result, signalled_at FROM correlations WHERE job_id = ?",
            )
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl CorrelationRepo for SqliteStore {
        async fn register_job(&self, record: &CorrelationRecord) -> MetadataResult<()> {
            if self.fetch_correlation(&record.job_id).await?.is_some() {
                return Err(MetadataError::AlreadyExists(format!(
                    "job_id {} already registered",
                    record.job_id
                )));
            }

            let row = CorrelationRow::from_record(record)?;
            sqlx::query(
                "INSERT INTO correlations (job_id, task_token, start_timestamp, finish_timestamp, job_result, signalled_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.job_id)
            .bind(&row.task_token)
            .bind(row.start_timestamp)
            .bind(row.finish_timestamp)
            .bind(&row.job_result)
            .bind(row.signalled_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_job(&self, job_id: &str) -> MetadataResult<Option<CorrelationRecord>> {
            self.fetch_correlation(job_id)
                .await?
                .map(CorrelationRow::into_record)
                .transpose()
        }

        async fn complete_job(
            &self,
            job_id: &str,
            result: &JobResult,
            finished_at: OffsetDateTime,
        ) -> MetadataResult<CompletionOutcome> {
            let job_result = serde_json::to_string(result)?;

            let mut tx = self.pool.begin().await?;
            let updated = sqlx::query(
                "UPDATE correlations SET job_result = ?, finish_timestamp = ? WHERE job_id = ? AND finish_timestamp IS NULL",
            )
            .bind(&job_result)
            .bind(finished_at)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

            let row = sqlx::query_as::<_, CorrelationRow>(
                "SELECT job_id, task_token, start_timestamp, finish_timestamp, job_result, signalled_at FROM correlations WHERE job_id = ?",
            )
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;

            let record = row
                .ok_or_else(|| MetadataError::NotFound(format!("job_id {job_id}")))?
                .into_record()?;
            if updated.rows_affected() > 0 {
                Ok(CompletionOutcome::Applied(record))
            } else {
                Ok(CompletionOutcome::AlreadyTerminal(record))
            }
        }

        async fn claim_signal(
            &self,
            job_id: &str,
            now: OffsetDateTime,
            lease: Duration,
        ) -> MetadataResult<bool> {
            let claimed_at = now.unix_timestamp();
            let stale_before = claimed_at.saturating_sub(lease.as_secs() as i64);

            let mut tx = self.pool.begin().await?;
            let updated = sqlx::query(
                r#"
                UPDATE correlations SET signal_claimed_at = ?
                WHERE job_id = ?
                  AND finish_timestamp IS NOT NULL
                  AND signalled_at IS NULL
                  AND (signal_claimed_at IS NULL OR signal_claimed_at <= ?)
                "#,
            )
            .bind(claimed_at)
            .bind(job_id)
            .bind(stale_before)
            .execute(&mut *tx)
            .await?;

            let exists: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM correlations WHERE job_id = ?")
                    .bind(job_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.commit().await?;

            if exists.is_none() {
                return Err(MetadataError::NotFound(format!("job_id {job_id}")));
            }
            Ok(updated.rows_affected() > 0)
        }

        async fn mark_signalled(&self, job_id: &str, at: OffsetDateTime) -> MetadataResult<()> {
            let updated = sqlx::query(
                "UPDATE correlations SET signalled_at = ?, signal_claimed_at = NULL WHERE job_id = ? AND signalled_at IS NULL",
            )
            .bind(at)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            if updated.rows_affected() == 0 && self.fetch_correlation(job_id).await?.is_none() {
                return Err(MetadataError::NotFound(format!("job_id {job_id}")));
            }
            Ok(())
        }

        async fn release_signal(&self, job_id: &str) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE correlations SET signal_claimed_at = NULL WHERE job_id = ? AND signalled_at IS NULL",
            )
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_in_progress(&self, limit: u32) -> MetadataResult<Vec<CorrelationRecord>> {
            let rows = sqlx::query_as::<_, CorrelationRow>(
                "SELECT job_id, task_token, start_timestamp, finish_timestamp, job_result, signalled_at FROM correlations WHERE finish_timestamp IS NULL ORDER BY start_timestamp ASC LIMIT ?",
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(CorrelationRow::into_record).collect()
        }
    }

    #[async_trait]
    impl PartRepo for SqliteStore {
        async fn record_part(
            &self,
            key: &TransferKey,
            part: &PartDescriptor,
            recorded_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            part.validate()?;
            let row = PartRow::new(key, part, recorded_at);
            sqlx::query(
                r#"
                INSERT INTO transfer_parts (pk, sk, part_number, etag, checksum_sha256, tree_checksum, recorded_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(pk, sk) DO UPDATE SET
                    etag = excluded.etag,
                    checksum_sha256 = excluded.checksum_sha256,
                    tree_checksum = excluded.tree_checksum,
                    recorded_at = excluded.recorded_at
                "#,
            )
            .bind(&row.pk)
            .bind(&row.sk)
            .bind(row.part_number)
            .bind(&row.etag)
            .bind(&row.checksum_sha256)
            .bind(&row.tree_checksum)
            .bind(row.recorded_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_parts(&self, key: &TransferKey) -> MetadataResult<Vec<PartDescriptor>> {
            let rows = sqlx::query_as::<_, PartRow>(
                "SELECT pk, sk, part_number, etag, checksum_sha256, tree_checksum, recorded_at FROM transfer_parts WHERE pk = ? ORDER BY sk ASC",
            )
            .bind(key.partition_key())
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(PartRow::into_descriptor).collect()
        }

        async fn count_parts(&self, key: &TransferKey) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transfer_parts WHERE pk = ?")
                .bind(key.partition_key())
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Vault job correlation records
CREATE TABLE IF NOT EXISTS correlations (
    job_id TEXT PRIMARY KEY,
    task_token TEXT,
    start_timestamp TEXT NOT NULL,
    finish_timestamp TEXT,
    job_result TEXT,
    -- Unix seconds of the delivery currently signalling the workflow
    signal_claimed_at INTEGER,
    signalled_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_correlations_pending ON correlations(start_timestamp) WHERE finish_timestamp IS NULL;

-- Multipart part ledger
CREATE TABLE IF NOT EXISTS transfer_parts (
    pk TEXT NOT NULL,
    sk TEXT NOT NULL,
    part_number INTEGER NOT NULL,
    etag TEXT NOT NULL,
    checksum_sha256 TEXT NOT NULL,
    tree_checksum TEXT,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (pk, sk)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetadataError;
    use crate::models::TransferKey;
    use crate::repos::CompletionOutcome;
    use std::sync::Arc;
    use time::macros::datetime;
    use vaultlift_core::{
        ContentHash, CorrelationRecord, CorrelationState, JobResult, JobStatus, PartDescriptor,
    };

    async fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("metadata.db")).await.unwrap();
        (dir, store)
    }

    fn registered(job_id: &str) -> CorrelationRecord {
        CorrelationRecord::new(
            job_id,
            Some("task-token".to_string()),
            datetime!(2024-05-01 12:00 UTC),
        )
    }

    #[tokio::test]
    async fn test_register_and_get_job() {
        let (_dir, store) = open_store().await;
        let record = registered("job-1");
        store.register_job(&record).await.unwrap();

        let loaded = store.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.state(), CorrelationState::InProgress);
        assert!(store.get_job("job-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let (_dir, store) = open_store().await;
        store.register_job(&registered("job-1")).await.unwrap();
        assert!(matches!(
            store.register_job(&registered("job-1")).await,
            Err(MetadataError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_job_applies_once() {
        let (_dir, store) = open_store().await;
        store.register_job(&registered("job-1")).await.unwrap();

        let succeeded = JobResult::new("job-1", JobStatus::Succeeded);
        let first = store
            .complete_job("job-1", &succeeded, datetime!(2024-05-01 12:30 UTC))
            .await
            .unwrap();
        assert!(first.is_applied());
        assert_eq!(
            first.record().state(),
            CorrelationState::Terminal(JobStatus::Succeeded)
        );

        // A late failure delivery does not overwrite the terminal record.
        let failed = JobResult::new("job-1", JobStatus::Failed);
        let second = store
            .complete_job("job-1", &failed, datetime!(2024-05-01 13:00 UTC))
            .await
            .unwrap();
        match second {
            CompletionOutcome::AlreadyTerminal(record) => {
                assert_eq!(record.finish_timestamp, Some(datetime!(2024-05-01 12:30 UTC)));
                assert_eq!(record.job_result.unwrap().status_code, JobStatus::Succeeded);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_unknown_job_is_not_found() {
        let (_dir, store) = open_store().await;
        let result = JobResult::new("ghost", JobStatus::Succeeded);
        assert!(matches!(
            store
                .complete_job("ghost", &result, datetime!(2024-05-01 12:30 UTC))
                .await,
            Err(MetadataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_completions_have_one_winner() {
        let (_dir, store) = open_store().await;
        let store = Arc::new(store);
        store.register_job(&registered("job-1")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let status = if i % 2 == 0 {
                    JobStatus::Succeeded
                } else {
                    JobStatus::Failed
                };
                store
                    .complete_job(
                        "job-1",
                        &JobResult::new("job-1", status),
                        datetime!(2024-05-01 12:30 UTC),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().is_applied() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_signal_claim_lifecycle() {
        let (_dir, store) = open_store().await;
        let lease = std::time::Duration::from_secs(300);
        let now = datetime!(2024-05-01 12:31 UTC);
        store.register_job(&registered("job-1")).await.unwrap();

        // Nothing to signal while the job is running.
        assert!(!store.claim_signal("job-1", now, lease).await.unwrap());

        store
            .complete_job(
                "job-1",
                &JobResult::new("job-1", JobStatus::Succeeded),
                datetime!(2024-05-01 12:30 UTC),
            )
            .await
            .unwrap();
        assert!(store.claim_signal("job-1", now, lease).await.unwrap());
        assert!(!store.claim_signal("job-1", now, lease).await.unwrap());

        // A failed delivery gives the claim back.
        store.release_signal("job-1").await.unwrap();
        assert!(store.claim_signal("job-1", now, lease).await.unwrap());

        // An abandoned claim expires after the lease.
        let later = now + time::Duration::minutes(6);
        assert!(store.claim_signal("job-1", later, lease).await.unwrap());

        store.mark_signalled("job-1", later).await.unwrap();
        let record = store.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(record.signalled_at, Some(later));
        let much_later = later + time::Duration::hours(1);
        assert!(!store.claim_signal("job-1", much_later, lease).await.unwrap());
        store.release_signal("job-1").await.unwrap();
        assert!(!store.claim_signal("job-1", much_later, lease).await.unwrap());

        assert!(matches!(
            store.claim_signal("ghost", now, lease).await,
            Err(MetadataError::NotFound(_))
        ));
        assert!(matches!(
            store.mark_signalled("ghost", now).await,
            Err(MetadataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let (_dir, store) = open_store().await;
        let store = Arc::new(store);
        store.register_job(&registered("job-1")).await.unwrap();
        store
            .complete_job(
                "job-1",
                &JobResult::new("job-1", JobStatus::Failed),
                datetime!(2024-05-01 12:30 UTC),
            )
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .claim_signal(
                            "job-1",
                            datetime!(2024-05-01 12:31 UTC),
                            std::time::Duration::from_secs(300),
                        )
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_list_in_progress() {
        let (_dir, store) = open_store().await;
        store.register_job(&registered("job-1")).await.unwrap();
        store.register_job(&registered("job-2")).await.unwrap();
        store
            .complete_job(
                "job-1",
                &JobResult::new("job-1", JobStatus::Succeeded),
                datetime!(2024-05-01 12:30 UTC),
            )
            .await
            .unwrap();

        let pending = store.list_in_progress(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job_id, "job-2");
    }

    #[tokio::test]
    async fn test_part_ledger_orders_and_replaces() {
        let (_dir, store) = open_store().await;
        let key = TransferKey::new("run-1", "archive-1");
        let other = TransferKey::new("run-1", "archive-2");
        let at = datetime!(2024-05-01 12:00 UTC);

        for n in [10u32, 2, 1] {
            let part = PartDescriptor::new(n, format!("\"e{n}\""), &ContentHash::compute(&[n as u8]));
            store.record_part(&key, &part, at).await.unwrap();
        }
        let retried = PartDescriptor::new(2, "\"retry\"", &ContentHash::compute(b"retry"))
            .with_tree_checksum("feed");
        store.record_part(&key, &retried, at).await.unwrap();
        store
            .record_part(
                &other,
                &PartDescriptor::new(1, "\"x\"", &ContentHash::compute(b"x")),
                at,
            )
            .await
            .unwrap();

        let parts = store.list_parts(&key).await.unwrap();
        let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
        assert_eq!(parts[1], retried);
        assert_eq!(store.count_parts(&key).await.unwrap(), 3);
        assert_eq!(store.count_parts(&other).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_part_rejects_invalid_descriptor() {
        let (_dir, store) = open_store().await;
        let key = TransferKey::new("run", "obj");
        let bad = PartDescriptor {
            part_number: 0,
            etag: "\"e\"".to_string(),
            checksum_sha256: ContentHash::compute(b"x").to_base64(),
            tree_checksum: None,
        };
        assert!(matches!(
            store
                .record_part(&key, &bad, datetime!(2024-05-01 12:00 UTC))
                .await,
            Err(MetadataError::InvalidPart(_))
        ));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_dir, store) = open_store().await;
        store.health_check().await.unwrap();
    }
}
