//! Crate-wide error taxonomy.
//!
//! Each variant corresponds to one of the user-visible error kinds named in
//! the job subsystem's error table: submission-time rejections, job-level
//! failures, and the catch-all for internal plumbing. Per-parcel outcomes
//! (`not_found`, per-row extraction/download errors) are not represented
//! here. They are data carried on `ScrapedRecord`, not control flow, since
//! the scrape loop must continue past them.

use thiserror::Error;

/// Errors that can terminate a job or reject a submission outright.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file exceeds the maximum allowed size")]
    InputTooLarge,

    #[error("identifier list has {found} entries, maximum allowed is {max}")]
    TooManyIdentifiers { found: usize, max: usize },

    #[error("portal host not recognized: {url}")]
    PortalUnrecognized { url: String },

    #[error("search input not found on {url} (page title: {page_title:?})")]
    SearchInputMissing { url: String, page_title: Option<String> },

    #[error("shapefile bundle has no Parcels.shp/Parcel.shp: {reason}")]
    ShapefileMissing { reason: String },

    #[error("join between scraped records and shapefile produced zero rows")]
    JoinEmpty,

    #[error("artifact upload failed: {key}: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("job was cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// The stable string tag surfaced on `Job.error` / the HTTP layer.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputTooLarge => "input_too_large",
            Self::TooManyIdentifiers { .. } => "too_many_identifiers",
            Self::PortalUnrecognized { .. } => "portal_unrecognized",
            Self::SearchInputMissing { .. } => "search_input_missing",
            Self::ShapefileMissing { .. } => "shapefile_missing",
            Self::JoinEmpty => "join_empty",
            Self::UploadFailed { .. } => "upload_failed",
            Self::Cancelled => "cancelled",
            Self::Other(_) => "internal_error",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_match_error_table() {
        assert_eq!(PipelineError::InputTooLarge.kind(), "input_too_large");
        assert_eq!(
            PipelineError::TooManyIdentifiers { found: 2000, max: 1000 }.kind(),
            "too_many_identifiers"
        );
        assert_eq!(PipelineError::JoinEmpty.kind(), "join_empty");
        assert_eq!(PipelineError::Cancelled.kind(), "cancelled");
    }
}
