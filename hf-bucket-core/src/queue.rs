//! SQLite-backed durable job queue.
//!
//! One row per job. Receiving a batch leases rows: their attempt counter goes up and they stay
//! hidden for the visibility timeout. `ack` deletes the row, `retry` makes it visible again
//! after the retry delay. A lease that is never settled (consumer crashed) simply expires and the
//! job is delivered again, so delivery is at-least-once.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::contract::{Delivery, JobQueue, MessageSource, QueueError};
use crate::job::TransferJob;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_jobs (
    job_id       TEXT PRIMARY KEY,
    payload_json TEXT NOT NULL,
    attempts     INTEGER NOT NULL DEFAULT 0,
    visible_at   INTEGER NOT NULL,
    enqueued_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS transfer_jobs_visible ON transfer_jobs (visible_at, enqueued_at)
"#;

#[derive(Debug, Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    visibility_timeout: Duration,
    retry_delay: Duration,
}

impl SqliteQueue {
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::new()
            .filename(&config.sqlite_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let queue = Self {
            pool,
            visibility_timeout: config.visibility_timeout(),
            retry_delay: config.retry_delay(),
        };
        queue.migrate().await?;
        info!(path = %config.sqlite_path.display(), "[QUEUE] SQLite queue ready");
        Ok(queue)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), QueueError> {
        for statement in SCHEMA_SQL.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Jobs not yet acknowledged, leased or not.
    pub async fn pending(&self) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transfer_jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn discard(&self, job_id: &str) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM transfer_jobs WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn enqueue(&self, job: &TransferJob) -> Result<(), QueueError> {
        let payload_json = serde_json::to_string(job)?;
        let now = now_millis();
        sqlx::query(
            "INSERT INTO transfer_jobs(job_id, payload_json, attempts, visible_at, enqueued_at) VALUES (?, ?, 0, ?, ?)",
        )
        .bind(job.job_id.to_string())
        .bind(payload_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        debug!(job_id = %job.job_id, "[QUEUE] Enqueued");
        Ok(())
    }
}

#[async_trait]
impl MessageSource for SqliteQueue {
    type Message = SqliteDelivery;

    async fn receive_batch(&self, max_messages: usize) -> Result<Vec<SqliteDelivery>, QueueError> {
        let now = now_millis();
        let hidden_until = now + duration_millis(self.visibility_timeout);

        let mut rows: Vec<(i64, String, String, i64, i64)> = sqlx::query_as(
            "UPDATE transfer_jobs SET attempts = attempts + 1, visible_at = ? \
             WHERE job_id IN (SELECT job_id FROM transfer_jobs WHERE visible_at <= ? ORDER BY enqueued_at, rowid LIMIT ?) \
             RETURNING rowid, job_id, payload_json, attempts, enqueued_at",
        )
        .bind(hidden_until)
        .bind(now)
        .bind(max_messages as i64)
        .fetch_all(&self.pool)
        .await?;
        // RETURNING order is unspecified.
        rows.sort_by_key(|(rowid, _, _, _, enqueued_at)| (*enqueued_at, *rowid));

        let mut batch = Vec::with_capacity(rows.len());
        for (_, job_id, payload_json, attempts, _) in rows {
            match serde_json::from_str::<TransferJob>(&payload_json) {
                Ok(job) => batch.push(SqliteDelivery {
                    pool: self.pool.clone(),
                    job,
                    attempts: attempts.max(0) as u32,
                    retry_delay: self.retry_delay,
                }),
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "[QUEUE] Undecodable message discarded");
                    if let Err(discard_err) = self.discard(&job_id).await {
                        // Left leased; it is retried on the next delivery.
                        warn!(job_id = %job_id, error = %discard_err, "[QUEUE] Discard failed");
                    }
                }
            }
        }
        Ok(batch)
    }
}

/// A leased row. Settling is guarded by the attempt number of this lease, so a holder whose
/// lease expired cannot settle the newer delivery.
pub struct SqliteDelivery {
    pool: SqlitePool,
    job: TransferJob,
    attempts: u32,
    retry_delay: Duration,
}

#[async_trait]
impl Delivery for SqliteDelivery {
    fn job(&self) -> TransferJob {
        self.job.clone()
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    async fn ack(&self) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM transfer_jobs WHERE job_id = ? AND attempts = ?")
            .bind(self.job.job_id.to_string())
            .bind(self.attempts as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            warn!(job_id = %self.job.job_id, attempt = self.attempts, "[QUEUE] Ack for superseded lease ignored");
        }
        Ok(())
    }

    async fn retry(&self) -> Result<(), QueueError> {
        let visible_at = now_millis() + duration_millis(self.retry_delay);
        let result = sqlx::query(
            "UPDATE transfer_jobs SET visible_at = ? WHERE job_id = ? AND attempts = ?",
        )
        .bind(visible_at)
        .bind(self.job.job_id.to_string())
        .bind(self.attempts as i64)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(job_id = %self.job.job_id, attempt = self.attempts, "[QUEUE] Retry for superseded lease ignored");
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX / 2)
}
