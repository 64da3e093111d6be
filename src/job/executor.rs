//! Job Executor: the single worker that claims one pending job
//! at a time and drives it through Portal Strategy → Document Downloader →
//! Label Export Pipeline → Artifact Publisher.
//!
//! Grounded on `worker.py`'s `_run`/`_process_job`/`_upload_results`: the
//! claim-sleep-claim loop, the `current_step` labels set at each stage, and
//! catching every error at the job boundary to mark it `failed` rather than
//! letting one bad job take the worker down.

use crate::blob_store::BlobStore;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::job::model::{Job, JobCounts, JobStatus, PortalKind, RecordOutcome, ScrapedRecord, ARTIFACT_DXF, ARTIFACT_EXCEL, ARTIFACT_PRC_BUNDLE};
use crate::job::repository::{JobPatch, JobRepository};
use crate::label_export;
use crate::parcel_file;
use crate::scraper::downloader::DocumentDownloader;
use crate::scraper::page_driver::{ChromiumPageDriver, PageDriver};
use crate::scraper::portal::extraction::owner_filename_stub;
use crate::scraper::portal::{BeaconStrategy, CancellationFlag, FailureBudget, PortalStrategy, WthgisStrategy};
use crate::scraper::rate_limiter::RateLimiter;
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const PARTIAL_SAVE_EVERY: usize = 10;

pub struct JobExecutor {
    repository: Arc<dyn JobRepository>,
    blob_store: Arc<dyn BlobStore>,
    config: PipelineConfig,
    cancellations: Arc<DashMap<Uuid, CancellationFlag>>,
}

impl JobExecutor {
    #[must_use]
    pub fn new(repository: Arc<dyn JobRepository>, blob_store: Arc<dyn BlobStore>, config: PipelineConfig) -> Self {
        Self { repository, blob_store, config, cancellations: Arc::new(DashMap::new()) }
    }

    /// Request cooperative cancellation of a running job. A no-op if the
    /// job isn't currently claimed by this worker.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        if let Some(flag) = self.cancellations.get(&job_id) {
            flag.cancel();
            true
        } else {
            false
        }
    }

    /// Run forever: claim the oldest pending job, process it to a terminal
    /// status, sleep `poll_interval` if the queue was empty.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.repository.claim_next_pending().await {
                Ok(Some(job)) => {
                    let job_id = job.id;
                    if let Err(err) = self.process_job(job).await {
                        tracing::error!(%job_id, error = %err, "job failed");
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "claiming next pending job");
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
            }
        }
    }

    async fn process_job(&self, job: Job) -> Result<()> {
        let job_id = job.id;
        let flag = CancellationFlag::new();
        self.cancellations.insert(job_id, flag.clone());
        let result = self.run_job(&job, &flag).await;
        self.cancellations.remove(&job_id);
        self.finalize_job(&job, result).await
    }

    /// Write the terminal status for a finished `run_job` attempt. Split out
    /// of `process_job` so the three terminal transitions are testable
    /// against synthetic results, without driving a real page.
    async fn finalize_job(&self, job: &Job, result: Result<std::collections::HashMap<String, String>>) -> Result<()> {
        let job_id = job.id;
        match result {
            Ok(results) => {
                self.repository
                    .update(
                        job_id,
                        JobPatch {
                            status: Some(JobStatus::Completed),
                            current_step: Some(None),
                            results: Some(results),
                            completed_at: Some(Some(chrono::Utc::now())),
                            ..Default::default()
                        },
                    )
                    .await
                    .context("marking job completed")?;
                tracing::info!(%job_id, county = %job.county, "job completed");
            }
            Err(err) if matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::Cancelled)) => {
                self.repository
                    .update(
                        job_id,
                        JobPatch {
                            status: Some(JobStatus::Cancelled),
                            completed_at: Some(Some(chrono::Utc::now())),
                            ..Default::default()
                        },
                    )
                    .await
                    .context("marking job cancelled")?;
                tracing::info!(%job_id, "job cancelled");
            }
            Err(err) => {
                self.repository
                    .update(
                        job_id,
                        JobPatch {
                            status: Some(JobStatus::Failed),
                            error: Some(Some(err.to_string())),
                            completed_at: Some(Some(chrono::Utc::now())),
                            ..Default::default()
                        },
                    )
                    .await
                    .context("marking job failed")?;
                tracing::error!(%job_id, county = %job.county, error = %err, "job failed");
            }
        }
        Ok(())
    }

    async fn set_step(&self, job_id: Uuid, step: &str) -> Result<()> {
        self.repository
            .update(job_id, JobPatch { current_step: Some(Some(step.to_string())), ..Default::default() })
            .await
            .context("updating current step")
    }

    fn check_cancelled(flag: &CancellationFlag) -> Result<()> {
        if flag.is_cancelled() {
            return Err(PipelineError::Cancelled.into());
        }
        Ok(())
    }

    async fn run_job(&self, job: &Job, flag: &CancellationFlag) -> Result<std::collections::HashMap<String, String>> {
        Self::check_cancelled(flag)?;

        let work_dir = self.config.job_dir(&job.id.to_string());
        tokio::fs::create_dir_all(&work_dir).await.context("creating job work directory")?;

        self.set_step(job.id, "Parsing parcel file").await?;
        self.blob_store
            .download_to(&job.parcel_input.blob_key, &job.parcel_input.local_path)
            .await
            .context("downloading parcel identifier file")?;
        self.blob_store
            .download_to(&job.shapefile_input.blob_key, &job.shapefile_input.local_path)
            .await
            .context("downloading shapefile bundle")?;

        let parcel_ids = parcel_file::read_parcel_ids(&job.parcel_input.local_path, self.config.max_identifiers())
            .context("reading parcel identifiers")?;

        self.repository
            .update(
                job.id,
                JobPatch { counts: Some(JobCounts { total: parcel_ids.len() as u32, ..JobCounts::default() }), ..Default::default() },
            )
            .await
            .context("recording parcel count")?;

        let strategy: Arc<dyn PortalStrategy> = match job.portal_kind {
            PortalKind::Beacon => Arc::new(BeaconStrategy::new(self.config.search_timeout())),
            PortalKind::Wthgis => Arc::new(WthgisStrategy::new(self.config.search_timeout())),
            PortalKind::Unknown => {
                return Err(PipelineError::PortalUnrecognized { url: job.portal_url.clone() }.into());
            }
        };

        self.set_step(job.id, &format!("Scraping {} parcels from {:?}", parcel_ids.len(), job.portal_kind)).await?;

        let mut driver = ChromiumPageDriver::launch(true).await.context("launching page driver")?;
        let documents_dir = work_dir.join("documents");
        tokio::fs::create_dir_all(&documents_dir).await.context("creating documents directory")?;

        let scrape_result = self
            .scrape_all(job, &mut driver, strategy.as_ref(), &parcel_ids, &documents_dir, flag, &work_dir)
            .await;
        driver.close().await.ok();
        let records = scrape_result?;

        Self::check_cancelled(flag)?;

        self.set_step(job.id, "Generating labels and DXF").await?;
        let outputs = label_export::run(&job.shapefile_input.local_path, records.clone(), job.crs_code as u32, &work_dir)
            .context("running label export pipeline")?;

        self.set_step(job.id, "Uploading results").await?;
        let documents: Vec<(String, PathBuf)> = records
            .iter()
            .filter_map(|r| {
                r.document_local_path.clone().map(|path| {
                    let stub = owner_filename_stub(r.owner_name.as_deref().unwrap_or_default());
                    (sanitize_filename::sanitize(format!("{stub}_{}.pdf", r.parcel_id)), path)
                })
            })
            .collect();

        let published = crate::artifact_publisher::publish(
            &self.blob_store,
            &self.config,
            &job.id.to_string(),
            &outputs.spreadsheet_path,
            &outputs.dxf_path,
            &documents,
            &work_dir,
        )
        .await
        .context("publishing job artifacts")?;

        let mut results = std::collections::HashMap::new();
        results.insert(ARTIFACT_EXCEL.to_string(), published.excel_key);
        results.insert(ARTIFACT_DXF.to_string(), published.dxf_key);
        if let Some(prc_key) = published.prc_bundle_key {
            results.insert(ARTIFACT_PRC_BUNDLE.to_string(), prc_key);
        }
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    async fn scrape_all(
        &self,
        job: &Job,
        driver: &mut dyn PageDriver,
        strategy: &dyn PortalStrategy,
        parcel_ids: &[String],
        documents_dir: &std::path::Path,
        flag: &CancellationFlag,
        work_dir: &std::path::Path,
    ) -> Result<Vec<ScrapedRecord>> {
        strategy.prepare(driver).await.context("preparing portal strategy")?;

        let downloader =
            DocumentDownloader::new(self.config.document_timeout()).context("building document downloader")?;
        let mut rate_limiter = RateLimiter::new(&self.config);
        let mut failure_budget = FailureBudget::new(self.config.max_consecutive_failures());

        let mut records = Vec::new();
        let mut completed = 0u32;
        let mut failed = 0u32;

        for (index, parcel_id) in parcel_ids.iter().enumerate() {
            Self::check_cancelled(flag)?;

            let outcome = strategy
                .search_and_extract(driver, &downloader, &rate_limiter, job, parcel_id, documents_dir)
                .await;

            match &outcome {
                RecordOutcome::Ok(record) => {
                    completed += 1;
                    records.push(record.clone());
                }
                RecordOutcome::NotFound => {
                    failed += 1;
                }
                RecordOutcome::Error(reason) => {
                    failed += 1;
                    tracing::warn!(%parcel_id, %reason, "parcel scrape failed");
                }
            }

            self.repository
                .update(job.id, JobPatch { counts: Some(JobCounts { total: parcel_ids.len() as u32, completed, failed }), ..Default::default() })
                .await
                .context("updating parcel counts")?;

            if failure_budget.record(&outcome) {
                anyhow::bail!("aborting after {} consecutive hard failures", self.config.max_consecutive_failures());
            }

            rate_limiter.after_parcel().await;

            if (index + 1) % PARTIAL_SAVE_EVERY == 0 {
                let partial_path = work_dir.join("parcels_enriched.partial.xlsx");
                if let Err(err) = label_export::spreadsheet::write_records(&records, &partial_path) {
                    tracing::warn!(error = %err, "writing partial progress spreadsheet");
                }
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::LocalBlobStore;
    use crate::job::model::InputFile;
    use crate::job::repository::SqliteJobRepository;
    use crate::scraper::page_driver::ElementHandle;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    async fn test_executor() -> (JobExecutor, Arc<SqliteJobRepository>) {
        let repo = Arc::new(SqliteJobRepository::connect("sqlite::memory:").await.expect("in-memory db"));
        let blob_store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(std::env::temp_dir()));
        let config = PipelineConfig::new()
            .with_page_delay(Duration::from_millis(1)..Duration::from_millis(2))
            .with_document_delay(Duration::from_millis(1)..Duration::from_millis(2));
        let executor = JobExecutor::new(repo.clone() as Arc<dyn JobRepository>, blob_store, config);
        (executor, repo)
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
    async fn finalize_job_ok_marks_completed_with_results() {
        let (executor, repo) = test_executor().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();

        let mut results = std::collections::HashMap::new();
        results.insert(ARTIFACT_EXCEL.to_string(), "jobs/1/out.xlsx".to_string());
        executor.finalize_job(&job, Ok(results.clone())).await.unwrap();

        let reloaded = repo.find(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Completed);
        assert_eq!(reloaded.results, results);
        assert!(reloaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn finalize_job_cancelled_error_marks_cancelled() {
        let (executor, repo) = test_executor().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();

        let err: anyhow::Error = PipelineError::Cancelled.into();
        executor.finalize_job(&job, Err(err)).await.unwrap();

        let reloaded = repo.find(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Cancelled);
        assert!(reloaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn finalize_job_other_error_marks_failed_with_message() {
        let (executor, repo) = test_executor().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();

        executor.finalize_job(&job, Err(anyhow::anyhow!("portal unreachable"))).await.unwrap();

        let reloaded = repo.find(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
        assert_eq!(reloaded.error.as_deref(), Some("portal unreachable"));
    }

    struct NoopPageDriver;

    #[async_trait]
    impl PageDriver for NoopPageDriver {
        async fn open(&mut self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn wait(&self, _duration: Duration) {}
        async fn find_first(&self, _selectors: &[&str], _timeout: Duration) -> Result<Option<ElementHandle>> {
            Ok(None)
        }
        async fn find_all(&self, _selector: &str, _timeout: Duration) -> Result<Vec<ElementHandle>> {
            Ok(Vec::new())
        }
        async fn fill(&self, _handle: &ElementHandle, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn press(&self, _handle: &ElementHandle, _key: &str) -> Result<()> {
            Ok(())
        }
        async fn click(&self, _handle: &ElementHandle) -> Result<()> {
            Ok(())
        }
        async fn attr(&self, _handle: &ElementHandle, _name: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn text(&self, _handle: &ElementHandle) -> Result<String> {
            Ok(String::new())
        }
        async fn inner_html(&self, _handle: &ElementHandle) -> Result<String> {
            Ok(String::new())
        }
        async fn page_title(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn current_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Always reports a hard failure, to drive `FailureBudget` to its limit.
    struct AlwaysErrorStrategy;

    #[async_trait]
    impl PortalStrategy for AlwaysErrorStrategy {
        async fn prepare(&self, _driver: &mut dyn PageDriver) -> Result<()> {
            Ok(())
        }

        async fn search_and_extract(
            &self,
            _driver: &mut dyn PageDriver,
            _downloader: &DocumentDownloader,
            _rate_limiter: &RateLimiter,
            _job: &Job,
            _parcel_id: &str,
            _download_dir: &Path,
        ) -> RecordOutcome {
            RecordOutcome::Error("simulated navigation failure".to_string())
        }
    }

    #[tokio::test]
    async fn scrape_all_aborts_once_failure_budget_is_exhausted() {
        let (executor, repo) = test_executor().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();

        let mut driver = NoopPageDriver;
        let strategy = AlwaysErrorStrategy;
        let parcel_ids: Vec<String> = (0..10).map(|i| format!("00{i}")).collect();
        let flag = CancellationFlag::new();
        let dir = tempfile::tempdir().unwrap();

        let result = executor
            .scrape_all(&job, &mut driver, &strategy, &parcel_ids, dir.path(), &flag, dir.path())
            .await;

        assert!(result.is_err());
        let reloaded = repo.find(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.counts.failed, executor.config.max_consecutive_failures());
        assert_eq!(reloaded.counts.completed, 0);
    }

    #[tokio::test]
    async fn scrape_all_respects_cancellation_before_each_parcel() {
        let (executor, repo) = test_executor().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();

        let mut driver = NoopPageDriver;
        let strategy = AlwaysErrorStrategy;
        let parcel_ids: Vec<String> = vec!["001".to_string()];
        let flag = CancellationFlag::new();
        flag.cancel();
        let dir = tempfile::tempdir().unwrap();

        let result = executor
            .scrape_all(&job, &mut driver, &strategy, &parcel_ids, dir.path(), &flag, dir.path())
            .await;

        assert!(matches!(result.unwrap_err().downcast_ref::<PipelineError>(), Some(PipelineError::Cancelled)));
    }
}
