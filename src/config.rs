//! Runtime configuration for the pipeline.
//!
//! A plain data struct with private fields and accessor methods, built via
//! a small fluent builder. Unlike the much larger crawl configuration this
//! crate's ancestor carries, nothing here is required to start a job: every
//! field has a sane default drawn from the original tool's settings, so a
//! typestate builder would be pure ceremony. `Default` plus setters is the
//! right-sized version of the same idiom.

use std::ops::Range;
use std::time::Duration;

/// Jittered delay range for one named rate-limiter class.
#[derive(Debug, Clone, Copy)]
pub struct DelayRange {
    pub lo: Duration,
    pub hi: Duration,
}

impl DelayRange {
    #[must_use]
    pub const fn new(lo: Duration, hi: Duration) -> Self {
        Self { lo, hi }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    page_delay: DelayRange,
    document_delay: DelayRange,
    thinking_pause_every: u32,
    thinking_pause_delay: DelayRange,
    search_timeout: Duration,
    document_timeout: Duration,
    max_consecutive_failures: u32,
    poll_interval: Duration,
    retention: Duration,
    max_identifiers: usize,
    upload_concurrency: usize,
    local_root: std::path::PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // Grounded on beacon_scraper.py: page_delay_range = (3, 7).
            page_delay: DelayRange::new(Duration::from_secs(3), Duration::from_secs(7)),
            // Grounded on beacon_scraper.py: pdf_delay_range = (2, 5).
            document_delay: DelayRange::new(Duration::from_secs(2), Duration::from_secs(5)),
            thinking_pause_every: 15,
            thinking_pause_delay: DelayRange::new(Duration::from_secs(10), Duration::from_secs(15)),
            search_timeout: Duration::from_secs(20),
            document_timeout: Duration::from_secs(45),
            max_consecutive_failures: 5,
            poll_interval: Duration::from_secs(5),
            retention: Duration::from_secs(30 * 24 * 3600),
            max_identifiers: 1000,
            upload_concurrency: 4,
            local_root: std::env::temp_dir().join("parcel_jobs"),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page_delay(mut self, range: Range<Duration>) -> Self {
        self.page_delay = DelayRange::new(range.start, range.end);
        self
    }

    #[must_use]
    pub fn with_document_delay(mut self, range: Range<Duration>) -> Self {
        self.document_delay = DelayRange::new(range.start, range.end);
        self
    }

    #[must_use]
    pub fn with_thinking_pause(mut self, every: u32, range: Range<Duration>) -> Self {
        self.thinking_pause_every = every;
        self.thinking_pause_delay = DelayRange::new(range.start, range.end);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub fn with_max_identifiers(mut self, max: usize) -> Self {
        self.max_identifiers = max;
        self
    }

    #[must_use]
    pub fn with_local_root(mut self, root: impl Into<std::path::PathBuf>) -> Self {
        self.local_root = root.into();
        self
    }

    #[must_use]
    pub fn page_delay(&self) -> DelayRange {
        self.page_delay
    }

    #[must_use]
    pub fn document_delay(&self) -> DelayRange {
        self.document_delay
    }

    #[must_use]
    pub fn thinking_pause_every(&self) -> u32 {
        self.thinking_pause_every
    }

    #[must_use]
    pub fn thinking_pause_delay(&self) -> DelayRange {
        self.thinking_pause_delay
    }

    #[must_use]
    pub fn search_timeout(&self) -> Duration {
        self.search_timeout
    }

    #[must_use]
    pub fn document_timeout(&self) -> Duration {
        self.document_timeout
    }

    #[must_use]
    pub fn max_consecutive_failures(&self) -> u32 {
        self.max_consecutive_failures
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    #[must_use]
    pub fn max_identifiers(&self) -> usize {
        self.max_identifiers
    }

    #[must_use]
    pub fn upload_concurrency(&self) -> usize {
        self.upload_concurrency
    }

    #[must_use]
    pub fn local_root(&self) -> &std::path::Path {
        &self.local_root
    }

    /// Job-scoped temp directory, created on demand by the executor.
    #[must_use]
    pub fn job_dir(&self, job_id: &str) -> std::path::PathBuf {
        self.local_root.join(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_settings() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.page_delay().lo, Duration::from_secs(3));
        assert_eq!(cfg.page_delay().hi, Duration::from_secs(7));
        assert_eq!(cfg.document_delay().lo, Duration::from_secs(2));
        assert_eq!(cfg.thinking_pause_every(), 15);
        assert_eq!(cfg.max_identifiers(), 1000);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = PipelineConfig::new()
            .with_max_identifiers(500)
            .with_poll_interval(Duration::from_secs(1));
        assert_eq!(cfg.max_identifiers(), 500);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
    }
}
