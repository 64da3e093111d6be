//! Startup Recovery: on executor boot, treat every `processing` job as
//! interrupted, not failed, and hand it back to the queue.

use crate::job::repository::JobRepository;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Resets every `processing` job to `pending`. Idempotent: running it twice
/// in succession is equivalent to running it once, since the second pass
/// finds nothing left in `processing`.
pub async fn run_startup_recovery(repository: &Arc<dyn JobRepository>) -> Result<u64> {
    let reset = repository.reset_orphans().await?;
    if reset > 0 {
        info!(count = reset, "startup recovery reset orphaned processing jobs to pending");
    }
    Ok(reset)
}
