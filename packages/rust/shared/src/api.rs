//! Collaborator interface to the remote batch provider.
//!
//! The pipeline only talks to the provider through [`BatchApi`]; the
//! concrete REST client lives in `gembatch-gemini`, tests use in-memory fakes.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::{BatchJob, JobKind, UploadedFile};

/// MIME type used when uploading JSONL request artifacts.
pub const JSONL_MIME_TYPE: &str = "application/jsonl";

/// Provider-shaped job creation envelope.
///
/// Built only by the submitter; content and embedding jobs carry their
/// source in structurally different fields (see `build_submission_payload`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub kind: JobKind,
    pub model: String,
    /// File handle (content) or wrapper object (embedding).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<Value>,
    /// Inline requests for content jobs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<Vec<Value>>,
    #[serde(default)]
    pub config: JobConfig,
}

/// Optional job settings forwarded to the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Remote batch API operations consumed by the pipeline.
#[async_trait]
pub trait BatchApi: Send + Sync {
    /// Upload a local file to the provider's file store.
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: Option<&str>,
    ) -> Result<UploadedFile>;

    /// Create a batch job from a submission envelope.
    async fn create_job(&self, payload: &SubmissionPayload) -> Result<BatchJob>;

    /// Fetch the current job snapshot.
    async fn get_job(&self, name: &str) -> Result<BatchJob>;

    /// Request cancellation; the job reaches a terminal state asynchronously.
    async fn cancel_job(&self, name: &str) -> Result<()>;

    /// Delete the job resource.
    async fn delete_job(&self, name: &str) -> Result<()>;

    /// Download the raw bytes of a provider file.
    async fn download_file(&self, name: &str) -> Result<Vec<u8>>;
}
