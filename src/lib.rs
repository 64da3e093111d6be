//! Parcel research job pipeline: scrapes county GIS portals for parcel
//! attributes and property-record documents, then joins the results
//! against a shapefile to emit a labeled CAD drawing and an enriched
//! spreadsheet.

pub mod artifact_publisher;
pub mod blob_store;
pub mod config;
pub mod error;
pub mod job;
pub mod label_export;
pub mod parcel_file;
pub mod scraper;

pub use blob_store::{BlobStore, LocalBlobStore};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use job::executor::JobExecutor;
pub use job::model::Job;
pub use job::repository::{JobRepository, SqliteJobRepository};
pub use job::sweeper::RetentionSweeper;
