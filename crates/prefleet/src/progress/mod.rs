//! Job progress tracking - polls submitted transfer jobs until all are
//! done, reporting byte deltas and supporting operator cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{JobStatus, RemoteService, TransferJob};
use crate::error::{PreError, Result};

/// Receives progress events from the tracker.
///
/// Implementations must be cheap; they are called from the polling loop.
pub trait ProgressSink: Send + Sync {
    /// A job entered tracking, with its first observed state.
    fn job_started(&self, job: &TransferJob);

    /// A poll observed `delta` new bytes for a job.
    fn job_progress(&self, job: &TransferJob, delta: u64);

    /// Every tracked job reached the done state.
    fn finished(&self);
}

/// Asks the operator whether running jobs should be aborted on cancel.
pub trait ConfirmAbort: Send + Sync {
    fn confirm_abort(&self) -> bool;
}

/// Delay before the first poll; the remote needs a moment to compute the
/// estimated size, which is meaningless before that.
const DEFAULT_GRACE: Duration = Duration::from_secs(1);

/// Interval between polls.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Polls a set of transfer jobs until every one reports done.
pub struct JobTracker {
    remote: Arc<dyn RemoteService>,
    grace: Duration,
    interval: Duration,
}

impl JobTracker {
    /// Create a tracker with the default grace period and poll interval.
    pub fn new(remote: Arc<dyn RemoteService>) -> Self {
        JobTracker {
            remote,
            grace: DEFAULT_GRACE,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Override the grace period and poll interval.
    pub fn with_timing(mut self, grace: Duration, interval: Duration) -> Self {
        self.grace = grace;
        self.interval = interval;
        self
    }

    /// Track the given jobs until all are done.
    ///
    /// Emits per-job byte deltas to `sink` on every poll. On cancellation
    /// the loop stops, `confirm` decides whether non-terminal jobs are
    /// aborted, and [`PreError::Cancelled`] is propagated either way.
    pub async fn wait(
        &self,
        job_ids: &[i64],
        sink: &dyn ProgressSink,
        confirm: &dyn ConfirmAbort,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            // No states observed yet; every submitted job is a candidate
            // for abort.
            _ = cancel.cancelled() => return self.cleanup(job_ids, confirm).await,
            _ = sleep(self.grace) => {}
        }

        let mut states = Vec::with_capacity(job_ids.len());
        for &id in job_ids {
            let job = self.remote.get_transfer_job(id).await?;
            sink.job_started(&job);
            states.push(job);
        }

        while !states.iter().all(|job| job.status == JobStatus::Done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let active: Vec<i64> = states
                        .iter()
                        .filter(|job| !job.status.is_terminal())
                        .map(|job| job.id)
                        .collect();
                    return self.cleanup(&active, confirm).await;
                }
                _ = sleep(self.interval) => {}
            }

            for state in &mut states {
                let job = self.remote.get_transfer_job(state.id).await?;
                let delta = job
                    .size_progress_bytes
                    .saturating_sub(state.size_progress_bytes);
                sink.job_progress(&job, delta);
                *state = job;
            }
        }

        sink.finished();
        Ok(())
    }

    /// Post-cancel cleanup: abort the given jobs if the operator confirms,
    /// then propagate the cancellation. No prompt when nothing is left to
    /// abort.
    async fn cleanup(&self, job_ids: &[i64], confirm: &dyn ConfirmAbort) -> Result<()> {
        if !job_ids.is_empty() && confirm.confirm_abort() {
            for &id in job_ids {
                if let Err(e) = self.remote.abort_transfer_job(id).await {
                    warn!(job = id, "failed to abort transfer job: {}", e);
                }
            }
            info!(count = job_ids.len(), "aborted running transfer jobs");
        }
        Err(PreError::Cancelled)
    }
}
