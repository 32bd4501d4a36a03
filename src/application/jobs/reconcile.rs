use std::{sync::Arc, time::Duration};

use metrics::counter;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::{
    metrics::METRIC_EXPORTS_RECONCILED,
    repos::{ExportJobsRepo, RepoError},
};

const TARGET: &str = "application::jobs::reconcile";

/// Stored on jobs the sweep gives up on.
pub const STALE_EXPORT_MESSAGE: &str = "export timed out while processing";

/// Fails every job that has sat in `processing` for longer than
/// `stale_after`. Queued and terminal jobs are never touched.
pub async fn reconcile_stale_exports(
    jobs: &dyn ExportJobsRepo,
    stale_after: Duration,
    now: OffsetDateTime,
) -> Result<Vec<Uuid>, RepoError> {
    let cutoff = now - stale_after;
    let failed = jobs
        .fail_stale_processing(cutoff, STALE_EXPORT_MESSAGE)
        .await?;

    if failed.is_empty() {
        debug!(target = TARGET, %cutoff, "no stale exports");
    } else {
        counter!(METRIC_EXPORTS_RECONCILED).increment(failed.len() as u64);
        for id in &failed {
            warn!(
                target = TARGET,
                export_job_id = %id,
                %cutoff,
                "stale export marked failed"
            );
        }
    }

    Ok(failed)
}

/// Runs [`reconcile_stale_exports`] every `every` until the handle is aborted.
pub fn spawn_reconciler(
    jobs: Arc<dyn ExportJobsRepo>,
    every: Duration,
    stale_after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            if let Err(err) =
                reconcile_stale_exports(jobs.as_ref(), stale_after, OffsetDateTime::now_utc()).await
            {
                error!(target = TARGET, error = %err, "stale export sweep failed");
            }
        }
    })
}
