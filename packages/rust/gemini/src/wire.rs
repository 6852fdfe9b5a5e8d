//! Translation between gembatch types and Gemini REST JSON.

use serde_json::{Value, json};
use tracing::warn;

use gembatch_shared::{
    BatchDestination, BatchJob, BatchStats, GembatchError, InlinedResponse, JobError, JobKind,
    JobState, Result, SubmissionPayload, UploadedFile,
};

/// Prefix a bare id with its collection (`batches/`, `files/`, `models/`).
pub(crate) fn qualify(collection: &str, id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty() {
        return Err(GembatchError::invalid_params(format!(
            "{collection} name must not be empty"
        )));
    }
    if id.contains('/') {
        Ok(id.to_string())
    } else {
        Ok(format!("{collection}/{id}"))
    }
}

/// REST method name for creating a job of `kind`.
pub(crate) fn create_method(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Content => "batchGenerateContent",
        JobKind::Embedding => "asyncBatchEmbedContent",
    }
}

/// Build the `{"batch": {...}}` create body from a submission envelope.
pub(crate) fn create_body(payload: &SubmissionPayload) -> Result<Value> {
    let model = qualify("models", &payload.model)?;
    let input_config = match (payload.kind, &payload.src, &payload.requests) {
        (JobKind::Content, Some(Value::String(file)), None) => json!({ "file_name": file }),
        (JobKind::Content, None, Some(requests)) => {
            json!({ "requests": { "requests": wrap_requests(requests) } })
        }
        (JobKind::Embedding, Some(src @ Value::Object(_)), None) => {
            if let Some(file) = src.get("file_name").and_then(Value::as_str) {
                json!({ "file_name": file })
            } else if let Some(requests) = src.get("inlined_requests").and_then(Value::as_array) {
                json!({ "requests": { "requests": wrap_requests(requests) } })
            } else {
                return Err(malformed(payload.kind));
            }
        }
        _ => return Err(malformed(payload.kind)),
    };

    let mut batch = json!({
        "model": model,
        "input_config": input_config,
    });
    if let Some(name) = &payload.config.display_name {
        batch["display_name"] = Value::String(name.clone());
    }
    Ok(json!({ "batch": batch }))
}

fn malformed(kind: JobKind) -> GembatchError {
    GembatchError::invalid_params(format!("malformed submission envelope for {kind} job"))
}

/// Inline requests as `{request, metadata: {key}}` entries.
///
/// Entries already shaped like JSONL records keep their key; bare request
/// bodies get `request-{n}` keys.
fn wrap_requests(requests: &[Value]) -> Vec<Value> {
    requests
        .iter()
        .enumerate()
        .map(|(i, r)| match r.get("request") {
            Some(inner) => {
                let key = r
                    .get("key")
                    .or_else(|| r.get("metadata").and_then(|m| m.get("key")))
                    .cloned()
                    .unwrap_or_else(|| Value::String(format!("request-{}", i + 1)));
                json!({ "request": inner, "metadata": { "key": key } })
            }
            None => json!({
                "request": r,
                "metadata": { "key": format!("request-{}", i + 1) }
            }),
        })
        .collect()
}

/// Decode a batch operation (or bare batch resource) into a [`BatchJob`].
pub(crate) fn parse_batch(value: &Value) -> Result<BatchJob> {
    let batch = value
        .get("metadata")
        .filter(|m| m.is_object())
        .unwrap_or(value);

    let name = value
        .get("name")
        .or_else(|| batch.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| GembatchError::parse("batch response has no `name`"))?;

    let state = match batch.get("state").and_then(Value::as_str) {
        Some(raw) => JobState::from_provider(raw).unwrap_or_else(|| {
            warn!(state = raw, "unrecognized batch state, treating as pending");
            JobState::Pending
        }),
        None => JobState::Pending,
    };

    let output = batch.get("output").or_else(|| value.get("response"));

    Ok(BatchJob {
        name: name.to_string(),
        display_name: string_field(batch, &["displayName", "display_name"]),
        state,
        dest: output.and_then(parse_destination),
        stats: batch
            .get("batchStats")
            .or_else(|| batch.get("batch_stats"))
            .map(parse_stats),
        error: value
            .get("error")
            .or_else(|| batch.get("error"))
            .map(parse_error),
        create_time: string_field(batch, &["createTime", "create_time"]),
        update_time: string_field(batch, &["updateTime", "update_time"]),
    })
}

fn parse_destination(output: &Value) -> Option<BatchDestination> {
    if let Some(file) = string_field(output, &["responsesFile", "responses_file"]) {
        return Some(BatchDestination::File(file));
    }

    let inline = [
        "inlinedResponses",
        "inlined_responses",
        "inlinedEmbedContentResponses",
        "inlined_embed_content_responses",
    ]
    .iter()
    .find_map(|field| output.get(*field))?;

    // The REST API nests the list one level deeper than the SDK does.
    let entries = inline
        .as_array()
        .or_else(|| {
            inline
                .as_object()
                .and_then(|o| o.values().find_map(Value::as_array))
        })?;

    Some(BatchDestination::Inline(
        entries.iter().map(parse_inlined).collect(),
    ))
}

fn parse_inlined(entry: &Value) -> InlinedResponse {
    InlinedResponse {
        key: entry
            .get("metadata")
            .and_then(|m| m.get("key"))
            .or_else(|| entry.get("key"))
            .and_then(Value::as_str)
            .map(str::to_string),
        response: entry.get("response").cloned(),
        error: entry.get("error").cloned(),
    }
}

fn parse_stats(stats: &Value) -> BatchStats {
    BatchStats {
        success_count: count_field(stats, &["successfulRequestCount", "successful_request_count"]),
        fail_count: count_field(stats, &["failedRequestCount", "failed_request_count"]),
        total_count: count_field(stats, &["requestCount", "request_count"]),
    }
}

fn parse_error(err: &Value) -> JobError {
    JobError {
        code: err.get("code").and_then(Value::as_i64),
        message: err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    }
}

/// Decode the `{"file": {...}}` upload response.
pub(crate) fn parse_file(value: &Value) -> Result<UploadedFile> {
    let file = value.get("file").unwrap_or(value);
    let name = file
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| GembatchError::parse("upload response has no file `name`"))?;
    Ok(UploadedFile {
        name: name.to_string(),
        uri: string_field(file, &["uri"]),
        mime_type: string_field(file, &["mimeType", "mime_type"]),
        display_name: string_field(file, &["displayName", "display_name"]),
        size_bytes: file
            .get("sizeBytes")
            .or_else(|| file.get("size_bytes"))
            .and_then(lenient_u64),
    })
}

/// Provider error message from an error body, if any.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| value.get(*n).and_then(Value::as_str))
        .map(str::to_string)
}

fn count_field(value: &Value, names: &[&str]) -> u64 {
    names
        .iter()
        .find_map(|n| value.get(*n).and_then(lenient_u64))
        .unwrap_or(0)
}

/// int64 fields arrive as JSON strings from the REST API.
fn lenient_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}
