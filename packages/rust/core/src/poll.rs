//! Job status polling.
//!
//! A single status fetch and a bounded wait loop share one entry point,
//! [`poll_job`]. Fetch errors end the loop immediately; the poller never
//! retries on its own.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use gembatch_shared::{BatchApi, BatchJob, GembatchError, Result};

use crate::progress::ProgressReporter;
use crate::submit::require_name;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Fetch the status once and return it, terminal or not.
    Once,
    /// Fetch until the job is terminal or `timeout` has elapsed.
    Until { interval: Duration, timeout: Duration },
}

impl Default for PollMode {
    fn default() -> Self {
        Self::Until {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub job: BatchJob,
    /// Number of status fetches performed.
    pub polls: usize,
    pub elapsed: Duration,
}

/// Fetch a job's status according to `mode`.
///
/// In `Until` mode the wait between fetches never overshoots the deadline;
/// once `timeout` has elapsed without a terminal state the call fails with
/// [`GembatchError::PollingTimeout`] carrying the last observed state.
#[instrument(skip_all, fields(job = name, ?mode))]
pub async fn poll_job(
    api: &dyn BatchApi,
    name: &str,
    mode: PollMode,
    progress: &dyn ProgressReporter,
) -> Result<PollOutcome> {
    let name = require_name(name)?;
    if matches!(mode, PollMode::Until { interval, .. } if interval.is_zero()) {
        return Err(GembatchError::invalid_params("poll interval must be positive"));
    }

    let start = Instant::now();
    let mut polls = 0;

    loop {
        let job = api.get_job(name).await?;
        polls += 1;
        let elapsed = start.elapsed();
        progress.job_polled(&job, polls, elapsed);
        debug!(state = %job.state, polls, ?elapsed, "status fetched");

        let (interval, timeout) = match mode {
            PollMode::Once => return Ok(PollOutcome { job, polls, elapsed }),
            PollMode::Until { interval, timeout } => (interval, timeout),
        };

        if job.state.is_terminal() {
            info!(state = %job.state, polls, ?elapsed, "job reached terminal state");
            return Ok(PollOutcome { job, polls, elapsed });
        }

        if elapsed >= timeout {
            return Err(GembatchError::PollingTimeout {
                job: job.name,
                state: job.state.to_string(),
                elapsed,
            });
        }

        tokio::time::sleep(interval.min(timeout - elapsed)).await;
    }
}
