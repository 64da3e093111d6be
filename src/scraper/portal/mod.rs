//! Portal Strategy: one closed variant per supported platform, sharing the
//! BOOT -> CONSENT? -> READY -> FOR-EACH -> DONE lifecycle.

pub mod extraction;
mod beacon;
mod wthgis;

pub use beacon::BeaconStrategy;
pub use wthgis::WthgisStrategy;

use crate::job::model::{Job, RecordOutcome};
use crate::scraper::downloader::DocumentDownloader;
use crate::scraper::page_driver::PageDriver;
use crate::scraper::rate_limiter::RateLimiter;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, re-read at every loop iteration and
/// before every outward side effect (design note: no preemptive task
/// termination).
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A closed variant implementing portal-specific search, extraction, and
/// document-URL resolution. New portals are added by adding a variant,
/// no dispatch through dynamic strings beyond the initial `portal_kind`
/// resolution already performed when the job was created.
#[async_trait]
pub trait PortalStrategy: Send + Sync {
    /// `BOOT` + `CONSENT?` + `READY`: open the driver, accept any consent
    /// dialog, and confirm the search input is present. Returns an error
    /// carrying the page title/URL diagnostic on `search_input_missing`.
    async fn prepare(&self, driver: &mut dyn PageDriver) -> Result<()>;

    /// `FOR-EACH` body for one identifier: search, extract, resolve and
    /// download the property-record document. Does not itself check
    /// cancellation or sleep; the executor's loop owns both.
    async fn search_and_extract(
        &self,
        driver: &mut dyn PageDriver,
        downloader: &DocumentDownloader,
        rate_limiter: &RateLimiter,
        job: &Job,
        parcel_id: &str,
        download_dir: &std::path::Path,
    ) -> RecordOutcome;
}

/// Consecutive-hard-failure counter used to abort a strategy run:
/// "More than K consecutive hard failures -> abort the strategy; the
/// executor marks the whole job failed." A hard failure is a navigation or
/// DOM exception (`RecordOutcome::Error`); `NotFound` does not count.
pub struct FailureBudget {
    max_consecutive: u32,
    consecutive: u32,
}

impl FailureBudget {
    #[must_use]
    pub fn new(max_consecutive: u32) -> Self {
        Self { max_consecutive, consecutive: 0 }
    }

    /// Record an outcome; returns `true` if the budget is exhausted and the
    /// strategy should abort.
    pub fn record(&mut self, outcome: &RecordOutcome) -> bool {
        match outcome {
            RecordOutcome::Error(_) => {
                self.consecutive += 1;
            }
            RecordOutcome::Ok(_) | RecordOutcome::NotFound => {
                self.consecutive = 0;
            }
        }
        self.consecutive >= self.max_consecutive
    }
}
