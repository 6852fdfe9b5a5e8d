//! Batch job orchestration for gembatch.
//!
//! This crate drives a [`BatchApi`](gembatch_shared::BatchApi) through the job
//! lifecycle (submit, poll, download) and ties those stages together with
//! ingestion into end-to-end workflows. [`tools::BatchTools`] exposes every
//! stage as a named tool taking JSON parameters.

pub mod download;
pub mod poll;
pub mod progress;
pub mod submit;
pub mod tools;
pub mod workflow;

#[cfg(test)]
mod fake;

pub use download::{DownloadedResults, ResultFormat, download_results, parse_result_lines};
pub use poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollMode, PollOutcome, poll_job};
pub use progress::{ProgressReporter, SilentProgress};
pub use submit::{
    SubmitRequest, SubmitSource, build_submission_payload, cancel_job, delete_job, submit_job,
};
pub use tools::{BatchTools, ToolDefaults, ToolDefinition, error_payload};
pub use workflow::{
    WorkflowConfig, WorkflowOutcome, run_content_workflow, run_embeddings_workflow,
};
