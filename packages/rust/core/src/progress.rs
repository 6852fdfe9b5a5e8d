//! Progress callbacks for long-running pipeline stages.

use std::time::Duration;

use gembatch_shared::BatchJob;

use crate::workflow::WorkflowOutcome;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after every status fetch while polling.
    fn job_polled(&self, job: &BatchJob, polls: usize, elapsed: Duration);
    /// Called when a workflow completes.
    fn done(&self, outcome: &WorkflowOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn job_polled(&self, _job: &BatchJob, _polls: usize, _elapsed: Duration) {}
    fn done(&self, _outcome: &WorkflowOutcome) {}
}
