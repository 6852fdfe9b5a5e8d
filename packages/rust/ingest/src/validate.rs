//! JSONL request artifact validation.
//!
//! [`validate_jsonl`] checks structural shape only and accepts both request
//! schemas, so one routine serves content and embedding jobs alike.
//! [`validate_for_kind`] is the stricter check used by ingestion: every record
//! must match the expected schema and embedding records must name a task type.
//!
//! Both scan the whole file and accumulate every problem with its 1-based
//! line number instead of stopping at the first.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use gembatch_shared::{GembatchError, JobKind, Result, TaskType};

/// Warning attached to a well-formed file that holds no records.
pub const NO_REQUESTS: &str = "file contains no requests";

/// Outcome of validating a JSONL artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Document-level observations that do not fail validation.
    pub warnings: Vec<String>,
    /// Number of records that passed validation.
    pub request_count: usize,
    pub content_records: usize,
    pub embedding_records: usize,
}

impl ValidationReport {
    /// Convert a failed report into a `ValidationFailed` error.
    pub fn into_result(self) -> Result<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(GembatchError::ValidationFailed {
                errors: self.errors,
            })
        }
    }
}

/// Validate a JSONL file, accepting either request schema on every line.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn validate_jsonl(path: &Path) -> Result<ValidationReport> {
    let content = std::fs::read_to_string(path).map_err(|e| GembatchError::io(path, e))?;
    Ok(validate_str(&content, None))
}

/// Validate a JSONL file against the schema of a specific job kind.
#[instrument(skip_all, fields(path = %path.display(), kind = %kind))]
pub fn validate_for_kind(path: &Path, kind: JobKind) -> Result<ValidationReport> {
    let content = std::fs::read_to_string(path).map_err(|e| GembatchError::io(path, e))?;
    Ok(validate_str(&content, Some(kind)))
}

/// Validate JSONL content held in memory.
///
/// With `expected = None` the check is schema-tolerant; with a kind, records of
/// the other schema and embedding records lacking a known `task_type` are errors.
pub fn validate_str(content: &str, expected: Option<JobKind>) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen_keys: HashMap<String, usize> = HashMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                report.errors.push(format!("Line {line_no}: invalid JSON: {e}"));
                continue;
            }
        };

        let kind = match check_record(&value, expected) {
            Ok(kind) => kind,
            Err(msg) => {
                report.errors.push(format!("Line {line_no}: {msg}"));
                continue;
            }
        };

        report.request_count += 1;
        match kind {
            JobKind::Content => report.content_records += 1,
            JobKind::Embedding => report.embedding_records += 1,
        }

        match value.get("key").and_then(Value::as_str) {
            Some(key) => {
                if let Some(first) = seen_keys.get(key) {
                    report.warnings.push(format!(
                        "Line {line_no}: duplicate key `{key}` (first seen on line {first})"
                    ));
                } else {
                    seen_keys.insert(key.to_string(), line_no);
                }
            }
            None => report
                .warnings
                .push(format!("Line {line_no}: record has no `key`")),
        }
    }

    if report.content_records > 0 && report.embedding_records > 0 {
        warn!(
            content = report.content_records,
            embedding = report.embedding_records,
            "JSONL mixes content and embedding records"
        );
        report.warnings.push(format!(
            "file mixes {} content and {} embedding records; a batch job accepts only one schema",
            report.content_records, report.embedding_records
        ));
    }

    if report.request_count == 0 && report.errors.is_empty() {
        report.warnings.push(NO_REQUESTS.to_string());
    }

    report.valid = report.errors.is_empty();
    debug!(
        valid = report.valid,
        requests = report.request_count,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "JSONL validated"
    );
    report
}

/// Check one parsed line; returns the schema it matched.
fn check_record(value: &Value, expected: Option<JobKind>) -> std::result::Result<JobKind, String> {
    let request = value
        .get("request")
        .filter(|r| r.is_object())
        .ok_or_else(|| "missing `request` object".to_string())?;

    let kind = if request.get("contents").is_some() {
        JobKind::Content
    } else if request.get("content").is_some() {
        JobKind::Embedding
    } else {
        return Err(
            "`request` must contain `contents` (content) or `content` (embedding)".to_string(),
        );
    };

    let Some(expected) = expected else {
        return Ok(kind);
    };

    if kind != expected {
        return Err(format!("expected a {expected} record, found a {kind} record"));
    }

    if kind == JobKind::Embedding {
        let task_type = request
            .get("task_type")
            .and_then(Value::as_str)
            .ok_or_else(|| "embedding record is missing `task_type`".to_string())?;
        task_type
            .parse::<TaskType>()
            .map_err(|_| format!("unknown task_type `{task_type}`"))?;
    }

    Ok(kind)
}
