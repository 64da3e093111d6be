//! The Queue Repository: persists job records and exposes the atomic
//! claim/update primitives the executor, sweeper, and recovery pass need.
//!
//! The interface is the minimal one this crate needs; this module also
//! ships one concrete implementation backed by SQLite via `sqlx`. The
//! sqlite feature was already present in `Cargo.toml` but unused in wired
//! code, so this wires up the dependency that was already present.

use crate::job::model::{Job, JobCounts, JobStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// A partial update applied to a job record. `None` fields are left
/// untouched; this mirrors a "patch" update rather than a full overwrite.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub current_step: Option<Option<String>>,
    pub counts: Option<JobCounts>,
    pub error: Option<Option<String>>,
    pub results: Option<std::collections::HashMap<String, String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Atomically find the oldest `pending` job, transition it to
    /// `processing`, stamp `started_at`/`updated_at`, and return it. FIFO
    /// by `created_at`; ties broken stably by insertion order.
    async fn claim_next_pending(&self) -> Result<Option<Job>>;

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<Job>>;

    async fn insert(&self, job: &Job) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Reset every `processing` job back to `pending`; idempotent.
    async fn reset_orphans(&self) -> Result<u64>;

    async fn list_older_than(&self, instant: DateTime<Utc>) -> Result<Vec<Job>>;
}

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .with_context(|| format!("connecting to job database at {url}"))?;
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("creating jobs table")?;

        // Matches the original's index strategy: (status, created_at) for
        // the FIFO claim query, created_at alone for the retention sweep.
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at)")
            .execute(&self.pool)
            .await
            .context("creating status/created_at index")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at)")
            .execute(&self.pool)
            .await
            .context("creating created_at index")?;
        Ok(())
    }

    fn encode(job: &Job) -> Result<String> {
        serde_json::to_string(job).context("encoding job record")
    }

    fn decode(raw: &str) -> Result<Job> {
        serde_json::from_str(raw).context("decoding job record")
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn claim_next_pending(&self) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await.context("beginning claim transaction")?;

        let row = sqlx::query(
            r"
            SELECT id, record FROM jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT 1
            ",
        )
        .fetch_optional(&mut *tx)
        .await
        .context("selecting oldest pending job")?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let id: String = row.try_get("id")?;
        let raw: String = row.try_get("record")?;
        let mut job = Self::decode(&raw)?;

        let now = Utc::now();
        job.status = JobStatus::Processing;
        job.started_at = Some(now);
        job.updated_at = now;

        let encoded = Self::encode(&job)?;
        sqlx::query("UPDATE jobs SET record = ?, status = 'processing' WHERE id = ?")
            .bind(&encoded)
            .bind(&id)
            .execute(&mut *tx)
            .await
            .context("writing claimed job")?;

        tx.commit().await.context("committing claim transaction")?;
        Ok(Some(job))
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<()> {
        let mut job = self
            .find(id)
            .await?
            .with_context(|| format!("job {id} not found for update"))?;

        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(step) = patch.current_step {
            job.current_step = step;
        }
        if let Some(counts) = patch.counts {
            job.counts = counts;
        }
        if let Some(error) = patch.error {
            job.error = error;
        }
        if let Some(results) = patch.results {
            job.results = results;
        }
        if let Some(started_at) = patch.started_at {
            job.started_at = started_at;
        }
        if let Some(completed_at) = patch.completed_at {
            job.completed_at = completed_at;
        }
        job.updated_at = Utc::now();

        let encoded = Self::encode(&job)?;
        let status_tag = status_tag(job.status);
        sqlx::query("UPDATE jobs SET record = ?, status = ? WHERE id = ?")
            .bind(&encoded)
            .bind(status_tag)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("updating job record")?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT record FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("selecting job by id")?;
        row.map(|r| {
            let raw: String = r.try_get("record")?;
            Self::decode(&raw)
        })
        .transpose()
    }

    async fn insert(&self, job: &Job) -> Result<()> {
        let encoded = Self::encode(job)?;
        sqlx::query("INSERT INTO jobs (id, record, status, created_at) VALUES (?, ?, ?, ?)")
            .bind(job.id.to_string())
            .bind(&encoded)
            .bind(status_tag(job.status))
            .bind(job.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("inserting job")?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("deleting job")?;
        Ok(())
    }

    async fn reset_orphans(&self) -> Result<u64> {
        let rows = sqlx::query("SELECT id, record FROM jobs WHERE status = 'processing'")
            .fetch_all(&self.pool)
            .await
            .context("selecting orphaned jobs")?;

        let mut reset = 0u64;
        for row in rows {
            let id: String = row.try_get("id")?;
            let raw: String = row.try_get("record")?;
            let mut job = Self::decode(&raw)?;
            job.status = JobStatus::Pending;
            job.updated_at = Utc::now();
            let encoded = Self::encode(&job)?;
            sqlx::query("UPDATE jobs SET record = ?, status = 'pending' WHERE id = ?")
                .bind(&encoded)
                .bind(&id)
                .execute(&self.pool)
                .await
                .context("resetting orphaned job")?;
            reset += 1;
        }
        Ok(reset)
    }

    async fn list_older_than(&self, instant: DateTime<Utc>) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT record FROM jobs WHERE created_at < ?")
            .bind(instant.to_rfc3339())
            .fetch_all(&self.pool)
            .await
            .context("selecting jobs older than retention threshold")?;

        rows.into_iter()
            .map(|row| {
                let raw: String = row.try_get("record")?;
                Self::decode(&raw)
            })
            .collect()
    }
}

fn status_tag(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::model::{InputFile, Job};

    async fn repo() -> SqliteJobRepository {
        SqliteJobRepository::connect("sqlite::memory:").await.expect("in-memory db")
    }

    fn sample_job() -> Job {
        Job::new_pending(
            "Madison".into(),
            6459,
            "https://beacon.schneidercorp.com".into(),
            InputFile { blob_key: "parcels.csv".into(), local_path: "/tmp/p.csv".into() },
            InputFile { blob_key: "shapefiles.zip".into(), local_path: "/tmp/s.zip".into() },
            None,
        )
    }

    #[tokio::test]
    async fn claims_oldest_pending_first() {
        let repo = repo().await;
        let mut a = sample_job();
        let mut b = sample_job();
        a.created_at = Utc::now() - chrono::Duration::seconds(10);
        b.created_at = Utc::now();
        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        let claimed = repo.claim_next_pending().await.unwrap().expect("a job");
        assert_eq!(claimed.id, a.id);
        assert_eq!(claimed.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn reset_orphans_is_idempotent() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();
        repo.claim_next_pending().await.unwrap();

        let first = repo.reset_orphans().await.unwrap();
        let second = repo.reset_orphans().await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);

        let reloaded = repo.find(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Pending);
    }
}
