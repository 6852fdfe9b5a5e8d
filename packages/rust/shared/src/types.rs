//! Core domain types for batch jobs, request records and results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GembatchError;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// Which batch endpoint a job targets. Always passed explicitly, never
/// inferred from the shape of the requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Content,
    Embedding,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Embedding => "embedding",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskType
// ---------------------------------------------------------------------------

/// Embedding task types accepted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    RetrievalQuery,
    RetrievalDocument,
    SemanticSimilarity,
    Classification,
    Clustering,
    QuestionAnswering,
    FactVerification,
    CodeRetrievalQuery,
}

impl TaskType {
    pub const ALL: [TaskType; 8] = [
        Self::RetrievalQuery,
        Self::RetrievalDocument,
        Self::SemanticSimilarity,
        Self::Classification,
        Self::Clustering,
        Self::QuestionAnswering,
        Self::FactVerification,
        Self::CodeRetrievalQuery,
    ];

    /// Wire name (`RETRIEVAL_DOCUMENT`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetrievalQuery => "RETRIEVAL_QUERY",
            Self::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            Self::SemanticSimilarity => "SEMANTIC_SIMILARITY",
            Self::Classification => "CLASSIFICATION",
            Self::Clustering => "CLUSTERING",
            Self::QuestionAnswering => "QUESTION_ANSWERING",
            Self::FactVerification => "FACT_VERIFICATION",
            Self::CodeRetrievalQuery => "CODE_RETRIEVAL_QUERY",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::RetrievalQuery => "Search queries matched against a document corpus",
            Self::RetrievalDocument => "Documents indexed for later retrieval",
            Self::SemanticSimilarity => "Comparing texts for similarity, deduplication, recommendations",
            Self::Classification => "Assigning texts to predefined labels",
            Self::Clustering => "Grouping texts by similarity without labels",
            Self::QuestionAnswering => "Questions answered from a knowledge base",
            Self::FactVerification => "Statements checked against evidence",
            Self::CodeRetrievalQuery => "Natural-language queries retrieving code blocks",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = GembatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                GembatchError::invalid_params(format!(
                    "unknown task type `{s}`; expected one of: {}",
                    Self::ALL.map(|t| t.as_str()).join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Lifecycle state of a remote batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl JobState {
    /// Terminal states end polling; they are not distinguished further there.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parse a provider state string (`JOB_STATE_*` or `BATCH_STATE_*`).
    ///
    /// Transitional states fold into the nearest of the six: queued and
    /// unspecified count as pending, updating/paused/cancelling as running.
    pub fn from_provider(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        let bare = upper
            .strip_prefix("JOB_STATE_")
            .or_else(|| upper.strip_prefix("BATCH_STATE_"))
            .unwrap_or(&upper);
        let state = match bare {
            "PENDING" | "QUEUED" | "UNSPECIFIED" => Self::Pending,
            "RUNNING" | "UPDATING" | "PAUSED" | "CANCELLING" => Self::Running,
            "SUCCEEDED" | "PARTIALLY_SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            "EXPIRED" => Self::Expired,
            _ => return None,
        };
        Some(state)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BatchJob
// ---------------------------------------------------------------------------

/// One entry of an inline results destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlinedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Where a finished job put its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchDestination {
    /// Responses returned in the job resource itself.
    Inline(Vec<InlinedResponse>),
    /// Responses written to a provider file (`files/...`).
    File(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub success_count: u64,
    pub fail_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
}

/// Snapshot of a remote batch job. The remote service owns the state;
/// this is only ever a fresh read of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    /// Opaque handle assigned by the provider (`batches/...`).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<BatchDestination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<BatchStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl BatchJob {
    /// A freshly created job with nothing but a handle and a state.
    pub fn new(name: impl Into<String>, state: JobState) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            state,
            dest: None,
            stats: None,
            error: None,
            create_time: None,
            update_time: None,
        }
    }

    /// Last path segment of the job name, safe for filenames.
    pub fn short_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Files and results
// ---------------------------------------------------------------------------

/// A file stored in the provider's file store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Provider handle (`files/...`).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// One decoded result. Exactly one of `response` / `error` is normally set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ResultRecord {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Concatenated text of the first candidate, when the response is a
    /// content-generation payload.
    pub fn text(&self) -> Option<String> {
        self.response.as_ref().and_then(response_text)
    }
}

/// Extract `candidates[0].content.parts[*].text` from a generate-content response.
pub fn response_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_type_parses_case_insensitively() {
        let t: TaskType = "retrieval_document".parse().unwrap();
        assert_eq!(t, TaskType::RetrievalDocument);
        let t: TaskType = "code-retrieval-query".parse().unwrap();
        assert_eq!(t, TaskType::CodeRetrievalQuery);
        assert!("EMBED_ALL".parse::<TaskType>().is_err());
    }

    #[test]
    fn task_type_serializes_to_wire_name() {
        let json = serde_json::to_string(&TaskType::SemanticSimilarity).unwrap();
        assert_eq!(json, "\"SEMANTIC_SIMILARITY\"");
        assert_eq!(TaskType::ALL.len(), 8);
    }

    #[test]
    fn job_state_accepts_both_provider_spellings() {
        assert_eq!(
            JobState::from_provider("JOB_STATE_SUCCEEDED"),
            Some(JobState::Succeeded)
        );
        assert_eq!(
            JobState::from_provider("BATCH_STATE_RUNNING"),
            Some(JobState::Running)
        );
        assert_eq!(
            JobState::from_provider("JOB_STATE_QUEUED"),
            Some(JobState::Pending)
        );
        assert_eq!(JobState::from_provider("NONSENSE"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        for s in [
            JobState::Succeeded,
            JobState::Failed,
            JobState::Cancelled,
            JobState::Expired,
        ] {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
    }

    #[test]
    fn short_id_strips_collection_prefix() {
        let job = BatchJob::new("batches/abc123", JobState::Pending);
        assert_eq!(job.short_id(), "abc123");
    }

    #[test]
    fn response_text_joins_parts() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "world"}]}}]
        });
        assert_eq!(response_text(&response).as_deref(), Some("Hello, world"));
        assert_eq!(response_text(&json!({"embedding": {"values": [0.1]}})), None);
    }
}
