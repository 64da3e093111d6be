//! Parcel pipeline worker: runs Startup Recovery once, then the Job
//! Executor and the Retention Sweeper as concurrent tasks under one Tokio
//! runtime.

use anyhow::{Context, Result};
use parcel_pipeline::job::recovery::run_startup_recovery;
use parcel_pipeline::{JobExecutor, LocalBlobStore, PipelineConfig, RetentionSweeper, SqliteJobRepository};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = PipelineConfig::new();

    let database_url = std::env::var("PARCEL_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    let repository: Arc<dyn parcel_pipeline::JobRepository> =
        Arc::new(SqliteJobRepository::connect(&database_url).await.context("connecting to job database")?);

    let blob_root = std::env::var("PARCEL_BLOB_ROOT").unwrap_or_else(|_| "./parcel_blobs".to_string());
    let blob_store: Arc<dyn parcel_pipeline::BlobStore> = Arc::new(LocalBlobStore::new(blob_root));

    run_startup_recovery(&repository).await.context("running startup recovery")?;

    let executor = Arc::new(JobExecutor::new(repository.clone(), blob_store.clone(), config.clone()));
    let sweeper = Arc::new(RetentionSweeper::new(repository, blob_store, config));

    let executor_handle = tokio::spawn(executor.run());
    let sweeper_handle = tokio::spawn(sweeper.run());

    tokio::select! {
        result = executor_handle => result.context("job executor task panicked")?,
        result = sweeper_handle => result.context("retention sweeper task panicked")?,
    }

    Ok(())
}
