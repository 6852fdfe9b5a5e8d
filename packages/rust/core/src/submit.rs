//! Job submission and lifecycle control.
//!
//! Content and embedding jobs use different envelope shapes:
//!
//! | kind      | file source              | inline source                    |
//! |-----------|--------------------------|----------------------------------|
//! | content   | `src: "files/..."`       | `requests: [...]`                |
//! | embedding | `src: {file_name: ...}`  | `src: {inlined_requests: [...]}` |
//!
//! [`build_submission_payload`] is the only place that knows this table.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use gembatch_shared::{
    BatchApi, BatchJob, GembatchError, JobConfig, JobKind, Result, SubmissionPayload,
};

/// Where the requests for a job come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitSource {
    /// Request bodies carried in the create call.
    Inline(Vec<Value>),
    /// Handle of a previously uploaded JSONL file.
    File(String),
}

/// Caller-facing submission parameters. Exactly one of `inline_requests` and
/// `file_name` must be set.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub kind: JobKind,
    pub model: String,
    pub inline_requests: Option<Vec<Value>>,
    pub file_name: Option<String>,
    pub options: JobConfig,
}

impl SubmitRequest {
    /// Resolve the mutually exclusive sources into a [`SubmitSource`].
    pub fn source(&self) -> Result<SubmitSource> {
        match (&self.inline_requests, &self.file_name) {
            (Some(_), Some(_)) => Err(GembatchError::invalid_params(
                "provide either inline requests or an input file, not both",
            )),
            (None, None) => Err(GembatchError::invalid_params(
                "either inline requests or an input file is required",
            )),
            (Some(requests), None) if requests.is_empty() => {
                Err(GembatchError::invalid_params("inline requests must not be empty"))
            }
            (Some(requests), None) => Ok(SubmitSource::Inline(requests.clone())),
            (None, Some(name)) if name.trim().is_empty() => {
                Err(GembatchError::invalid_params("input file name must not be empty"))
            }
            (None, Some(name)) => Ok(SubmitSource::File(name.trim().to_string())),
        }
    }
}

/// Build the provider envelope for a job of `kind`.
pub fn build_submission_payload(
    kind: JobKind,
    model: &str,
    source: SubmitSource,
    options: JobConfig,
) -> SubmissionPayload {
    let (src, requests) = match (kind, source) {
        (JobKind::Content, SubmitSource::File(name)) => (Some(Value::String(name)), None),
        (JobKind::Content, SubmitSource::Inline(requests)) => (None, Some(requests)),
        (JobKind::Embedding, SubmitSource::File(name)) => (Some(json!({ "file_name": name })), None),
        (JobKind::Embedding, SubmitSource::Inline(requests)) => {
            (Some(json!({ "inlined_requests": requests })), None)
        }
    };

    SubmissionPayload {
        kind,
        model: model.to_string(),
        src,
        requests,
        config: options,
    }
}

/// Validate parameters, build the envelope and create the remote job.
///
/// Jobs without a display name get `gembatch-{kind}-{timestamp}`.
#[instrument(skip_all, fields(kind = %request.kind, model = %request.model))]
pub async fn submit_job(api: &dyn BatchApi, request: SubmitRequest) -> Result<BatchJob> {
    if request.model.trim().is_empty() {
        return Err(GembatchError::invalid_params("model must not be empty"));
    }
    let source = request.source()?;

    let mut options = request.options;
    if options.display_name.is_none() {
        options.display_name = Some(format!(
            "gembatch-{}-{}",
            request.kind,
            Utc::now().format("%Y%m%d-%H%M%S")
        ));
    }

    let payload = build_submission_payload(request.kind, request.model.trim(), source, options);
    let job = api.create_job(&payload).await?;
    info!(job = %job.name, state = %job.state, "batch job created");
    Ok(job)
}

#[instrument(skip(api))]
pub async fn cancel_job(api: &dyn BatchApi, name: &str) -> Result<()> {
    let name = require_name(name)?;
    api.cancel_job(name).await?;
    info!(job = name, "cancellation requested");
    Ok(())
}

#[instrument(skip(api))]
pub async fn delete_job(api: &dyn BatchApi, name: &str) -> Result<()> {
    let name = require_name(name)?;
    api.delete_job(name).await?;
    info!(job = name, "job deleted");
    Ok(())
}

pub(crate) fn require_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        Err(GembatchError::invalid_params("batch name must not be empty"))
    } else {
        Ok(name)
    }
}
