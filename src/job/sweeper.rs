//! Retention Sweeper: periodically deletes job records, their
//! uploaded artifacts, and their local work directory once older than the
//! configured retention threshold.
//!
//! A sweep error on one job is logged and does not abort the pass.
//! The remaining jobs in the batch are still worth sweeping.

use crate::blob_store::BlobStore;
use crate::config::PipelineConfig;
use crate::job::repository::JobRepository;
use std::sync::Arc;

pub struct RetentionSweeper {
    repository: Arc<dyn JobRepository>,
    blob_store: Arc<dyn BlobStore>,
    config: PipelineConfig,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(repository: Arc<dyn JobRepository>, blob_store: Arc<dyn BlobStore>, config: PipelineConfig) -> Self {
        Self { repository, blob_store, config }
    }

    /// Run forever on a fixed interval, sweeping everything older than
    /// `retention` at each tick.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once().await {
                tracing::error!(error = %err, "retention sweep pass failed");
            }
        }
    }

    async fn sweep_once(&self) -> anyhow::Result<()> {
        let threshold = chrono::Utc::now() - chrono::Duration::from_std(self.config.retention())?;
        let stale = self.repository.list_older_than(threshold).await?;
        if stale.is_empty() {
            return Ok(());
        }
        tracing::info!(count = stale.len(), "sweeping stale jobs");

        for job in stale {
            let prefix = format!("jobs/{}", job.id);
            for key in self.blob_store.list_prefix(&prefix).await.unwrap_or_default() {
                if let Err(err) = self.blob_store.delete(&key).await {
                    tracing::warn!(%key, error = %err, "failed to delete stale artifact");
                }
            }

            let work_dir = self.config.job_dir(&job.id.to_string());
            if let Err(err) = tokio::fs::remove_dir_all(&work_dir).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(job_id = %job.id, error = %err, "failed to remove job work directory");
                }
            }

            if let Err(err) = self.repository.delete(job.id).await {
                tracing::warn!(job_id = %job.id, error = %err, "failed to delete job record");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::LocalBlobStore;
    use crate::job::model::{InputFile, Job};
    use crate::job::repository::SqliteJobRepository;
    use std::time::Duration;

    #[tokio::test]
    async fn sweeps_jobs_older_than_retention() {
        let repo: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::connect("sqlite::memory:").await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(dir.path()));

        let mut job = Job::new_pending(
            "Madison".into(),
            6459,
            "https://beacon.schneidercorp.com".into(),
            InputFile { blob_key: "p.csv".into(), local_path: "/tmp/p.csv".into() },
            InputFile { blob_key: "s.zip".into(), local_path: "/tmp/s.zip".into() },
            None,
        );
        job.created_at = chrono::Utc::now() - chrono::Duration::days(60);
        repo.insert(&job).await.unwrap();

        let config = PipelineConfig::new().with_retention(Duration::from_secs(30 * 24 * 3600));
        let sweeper = RetentionSweeper::new(repo.clone(), store, config);
        sweeper.sweep_once().await.unwrap();

        assert!(repo.find(job.id).await.unwrap().is_none());
    }
}
