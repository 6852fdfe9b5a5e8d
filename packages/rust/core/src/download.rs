//! Result retrieval for finished jobs.
//!
//! Inline results are rendered to a pretty JSON array; file results are
//! fetched from the provider, parsed line by line and persisted verbatim as
//! JSONL. Both land in the output directory under
//! `batch_results_{job}_{timestamp}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use gembatch_shared::{
    BatchApi, BatchDestination, BatchJob, GembatchError, InlinedResponse, Result, ResultRecord,
    response_text,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    Json,
    Jsonl,
}

impl ResultFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Jsonl => "jsonl",
        }
    }
}

/// Decoded results plus the path they were saved to.
///
/// Records keep the provider's order, which is not guaranteed to match the
/// submission order; use [`DownloadedResults::by_key`] to re-join them.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadedResults {
    pub job: String,
    pub results: Vec<ResultRecord>,
    pub file_path: PathBuf,
    pub format: ResultFormat,
}

impl DownloadedResults {
    /// Records indexed by request key. Unkeyed records are skipped.
    pub fn by_key(&self) -> HashMap<&str, &ResultRecord> {
        self.results
            .iter()
            .filter_map(|r| r.key.as_deref().map(|k| (k, r)))
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_error()).count()
    }

    pub fn success_count(&self) -> usize {
        self.results.len() - self.error_count()
    }
}

/// Retrieve and persist the results of a terminal job.
#[instrument(skip_all, fields(job = %job.name, output_dir = %output_dir.display()))]
pub async fn download_results(
    api: &dyn BatchApi,
    job: &BatchJob,
    output_dir: &Path,
) -> Result<DownloadedResults> {
    if !job.state.is_terminal() {
        return Err(GembatchError::invalid_params(format!(
            "job {} is {}; results are only available once it has finished",
            job.name, job.state
        )));
    }

    let (results, format, bytes) = match &job.dest {
        Some(BatchDestination::Inline(entries)) => {
            let rendered: Vec<Value> = entries.iter().map(render_inline).collect();
            let bytes = serde_json::to_vec_pretty(&rendered)
                .map_err(|e| GembatchError::parse(e.to_string()))?;
            let results = entries.iter().map(record_from_inline).collect();
            (results, ResultFormat::Json, bytes)
        }
        Some(BatchDestination::File(file)) => {
            let bytes = api.download_file(file).await?;
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| GembatchError::parse(format!("results file {file}: {e}")))?;
            let results = parse_result_lines(text)?;
            (results, ResultFormat::Jsonl, bytes)
        }
        None => {
            return Err(GembatchError::NoResultsAvailable {
                job: job.name.clone(),
            });
        }
    };

    std::fs::create_dir_all(output_dir).map_err(|e| GembatchError::io(output_dir, e))?;
    let file_path = output_dir.join(result_file_name(job, format));
    std::fs::write(&file_path, &bytes).map_err(|e| GembatchError::io(&file_path, e))?;

    info!(
        results = results.len(),
        path = %file_path.display(),
        "results saved"
    );

    Ok(DownloadedResults {
        job: job.name.clone(),
        results,
        file_path,
        format,
    })
}

/// Parse every non-blank line of a results file. One bad line fails the lot.
pub fn parse_result_lines(text: &str) -> Result<Vec<ResultRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<ResultRecord>(line)
                .map_err(|e| GembatchError::parse(format!("results line {}: {e}", idx + 1)))
        })
        .collect()
}

fn result_file_name(job: &BatchJob, format: ResultFormat) -> String {
    format!(
        "batch_results_{}_{}.{}",
        job.short_id(),
        Utc::now().format("%Y%m%d_%H%M%S%3f"),
        format.extension()
    )
}

/// Text for content responses, the raw value otherwise, `{"error"}` on failure.
fn render_inline(entry: &InlinedResponse) -> Value {
    if let Some(error) = &entry.error {
        return json!({ "error": error });
    }
    match &entry.response {
        Some(response) => response_text(response)
            .map(Value::String)
            .unwrap_or_else(|| response.clone()),
        None => Value::Null,
    }
}

fn record_from_inline(entry: &InlinedResponse) -> ResultRecord {
    ResultRecord {
        key: entry.key.clone(),
        response: entry.response.clone(),
        error: entry.error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBatchApi, job, succeeded_file, succeeded_inline, temp_dir};
    use gembatch_shared::JobState;

    fn text_response(text: &str) -> Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    #[tokio::test]
    async fn inline_results_are_rendered_as_json_array() {
        let dir = temp_dir("gb-download-inline");
        let job = succeeded_inline(vec![
            InlinedResponse {
                key: Some("request-1".into()),
                response: Some(text_response("hello")),
                error: None,
            },
            InlinedResponse {
                key: Some("request-2".into()),
                response: None,
                error: Some(json!({"code": 3, "message": "bad request"})),
            },
            InlinedResponse {
                key: None,
                response: Some(json!({"embedding": {"values": [0.1, 0.2]}})),
                error: None,
            },
        ]);

        let out = download_results(&FakeBatchApi::new(), &job, &dir).await.unwrap();
        assert_eq!(out.format, ResultFormat::Json);
        assert_eq!(out.results.len(), 3);
        assert_eq!(out.error_count(), 1);
        assert_eq!(out.success_count(), 2);

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(&out.file_path).unwrap()).unwrap();
        assert_eq!(saved[0], "hello");
        assert_eq!(saved[1]["error"]["message"], "bad request");
        assert_eq!(saved[2]["embedding"]["values"][1], 0.2);

        let name = out.file_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("batch_results_fake-1_"), "got {name}");
        assert!(name.ends_with(".json"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn file_results_are_parsed_and_saved_verbatim() {
        let dir = temp_dir("gb-download-file");
        let raw = concat!(
            r#"{"key":"request-2","response":{"candidates":[{"content":{"parts":[{"text":"b"}]}}]}}"#,
            "\n",
            r#"{"key":"request-1","error":{"message":"blocked"}}"#,
            "\n\n"
        );
        let api = FakeBatchApi::new().with_file("files/out-1", raw.as_bytes());

        let out = download_results(&api, &succeeded_file("files/out-1"), &dir)
            .await
            .unwrap();
        assert_eq!(out.format, ResultFormat::Jsonl);
        assert_eq!(out.results.len(), 2);
        assert_eq!(std::fs::read_to_string(&out.file_path).unwrap(), raw);

        let by_key = out.by_key();
        assert_eq!(by_key["request-2"].text().as_deref(), Some("b"));
        assert!(by_key["request-1"].is_error());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn malformed_result_line_fails_whole_download() {
        let dir = temp_dir("gb-download-bad");
        let raw = "{\"key\":\"a\",\"response\":{}}\nnot json\n";
        let api = FakeBatchApi::new().with_file("files/out-1", raw.as_bytes());

        let err = download_results(&api, &succeeded_file("files/out-1"), &dir)
            .await
            .unwrap_err();
        match err {
            GembatchError::Parse { message } => assert!(message.contains("line 2"), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn terminal_job_without_destination_has_no_results() {
        let dir = temp_dir("gb-download-none");
        let err = download_results(&FakeBatchApi::new(), &job(JobState::Failed), &dir)
            .await
            .unwrap_err();
        assert!(matches!(err, GembatchError::NoResultsAvailable { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn running_job_is_rejected() {
        let dir = temp_dir("gb-download-running");
        let err = download_results(&FakeBatchApi::new(), &job(JobState::Running), &dir)
            .await
            .unwrap_err();
        assert!(matches!(err, GembatchError::InvalidParams { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }
}
