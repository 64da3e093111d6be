//! The Parcel Job record and the transient types produced while executing one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Which portal-specific state machine drives this job.
///
/// Closed variant set per the design note on strategy variants: new portals
/// are added by adding a variant, not by widening a dynamic string match
/// past the initial URL-resolution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalKind {
    Wthgis,
    Beacon,
    Unknown,
}

impl PortalKind {
    /// Resolve a portal kind from a GIS portal URL's hostname, by substring
    /// match against the known table. Unknown hosts fail the job at `BOOT`.
    #[must_use]
    pub fn detect(url: &str) -> Self {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_default();

        if host.contains("wthgis.com") {
            Self::Wthgis
        } else if host.contains("beacon.schneidercorp.com") {
            Self::Beacon
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One blob-backed input file, with a hint to where it lives (or should be
/// downloaded to) on local disk once the executor has pre-flighted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFile {
    pub blob_key: String,
    pub local_path: std::path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobCounts {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
}

impl JobCounts {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * f64::from(self.completed + self.failed) / f64::from(self.total)
        }
    }
}

/// Canonical artifact kinds uploaded by the publisher, keyed into `results`.
pub const ARTIFACT_EXCEL: &str = "excel";
pub const ARTIFACT_DXF: &str = "dxf";
pub const ARTIFACT_PRC_BUNDLE: &str = "prc_bundle";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOwner {
    pub id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// The central entity of the job subsystem, owned exclusively by the
/// `JobRepository`. Mutated only by the single worker while `status =
/// processing`; read by any number of external readers concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner: Option<JobOwner>,
    pub county: String,
    pub crs_code: i32,
    pub portal_url: String,
    pub portal_kind: PortalKind,
    pub parcel_input: InputFile,
    pub shapefile_input: InputFile,
    pub status: JobStatus,
    pub current_step: Option<String>,
    pub counts: JobCounts,
    pub error: Option<String>,
    pub results: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Construct a new job in `pending`, matching the invariant that
    /// `started_at`, `results`, and `error` are all empty at that point.
    #[must_use]
    pub fn new_pending(
        county: String,
        crs_code: i32,
        portal_url: String,
        parcel_input: InputFile,
        shapefile_input: InputFile,
        owner: Option<JobOwner>,
    ) -> Self {
        let now = Utc::now();
        let portal_kind = PortalKind::detect(&portal_url);
        Self {
            id: Uuid::new_v4(),
            owner,
            county,
            crs_code,
            portal_url,
            portal_kind,
            parcel_input,
            shapefile_input,
            status: JobStatus::Pending,
            current_step: None,
            counts: JobCounts::default(),
            error: None,
            results: HashMap::new(),
            created_at: now,
            started_at: None,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Estimated remaining time while processing, per the formula:
    /// `avg_elapsed_per_completed_parcel * (total - completed)`.
    #[must_use]
    pub fn estimated_remaining_seconds(&self) -> Option<f64> {
        if self.status != JobStatus::Processing {
            return None;
        }
        let started = self.started_at?;
        let elapsed = (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0;
        if self.counts.completed == 0 {
            return None;
        }
        let avg = elapsed / f64::from(self.counts.completed);
        let remaining = self.counts.total.saturating_sub(self.counts.completed);
        Some(avg * f64::from(remaining))
    }
}

/// Outcome of attempting to scrape a single parcel identifier. Mirrors the
/// "dynamic record shape vs. statically typed target" design note: the
/// strategy returns this sum type, not a record with a string status field.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Ok(ScrapedRecord),
    NotFound,
    Error(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Debug, Clone, Default)]
pub struct TransferRow {
    pub date: Option<String>,
    pub deed_code: Option<String>,
    pub instrument_or_book_page: Option<String>,
}

/// A single scraped parcel's attributes, transient: produced by a Portal
/// Strategy, consumed by the Label Export Pipeline, never persisted as-is.
#[derive(Debug, Clone, Default)]
pub struct ScrapedRecord {
    pub parcel_id: String,
    pub alternate_id: Option<String>,
    pub owner_name: Option<String>,
    pub owner_address: Address,
    pub situs_address: Address,
    pub legal_description: Option<String>,
    pub latest_transfer: Option<TransferRow>,
    pub document_url: Option<String>,
    pub document_local_path: Option<std::path::PathBuf>,
    pub download_error: Option<String>,
}
