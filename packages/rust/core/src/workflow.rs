//! End-to-end workflow: source file → JSONL → upload → submit → poll → results.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument, warn};

use gembatch_ingest::{
    ConvertOptions, IngestionReport, NO_REQUESTS, SourceFormat, TargetSchema, ValidationReport,
    convert_to_jsonl, validate_for_kind,
};
use gembatch_shared::{
    BatchApi, BatchJob, GembatchError, JSONL_MIME_TYPE, JobConfig, JobState, Result, TaskType,
    UploadedFile,
};

use crate::download::{DownloadedResults, download_results};
use crate::poll::{PollMode, poll_job};
use crate::progress::ProgressReporter;
use crate::submit::{SubmitRequest, submit_job};

/// Configuration for one workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Source file in any supported format. `.jsonl` skips conversion.
    pub source: PathBuf,
    pub model: String,
    /// Where converted artifacts and results are written.
    pub output_dir: PathBuf,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub display_name: Option<String>,
}

/// Result of a completed workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    /// Final job snapshot.
    pub job: BatchJob,
    /// Present when the source had to be converted.
    pub ingestion: Option<IngestionReport>,
    pub validation: ValidationReport,
    pub uploaded_file: UploadedFile,
    /// Present only when the job succeeded.
    pub results: Option<DownloadedResults>,
    pub polls: usize,
    pub elapsed: Duration,
}

impl WorkflowOutcome {
    pub fn succeeded(&self) -> bool {
        self.job.state == JobState::Succeeded
    }
}

/// Run the content-generation workflow.
pub async fn run_content_workflow(
    api: &dyn BatchApi,
    config: &WorkflowConfig,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    run_workflow(api, config, TargetSchema::Content, progress).await
}

/// Run the embedding workflow. The task type is applied to every record
/// produced by conversion and required on every record of a JSONL source.
/// JSONL records naming a different task type are submitted as written, with
/// a warning.
pub async fn run_embeddings_workflow(
    api: &dyn BatchApi,
    config: &WorkflowConfig,
    task_type: TaskType,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    run_workflow(api, config, TargetSchema::Embedding(task_type), progress).await
}

/// 1. Convert the source to JSONL (unless it already is)
/// 2. Validate against the job kind
/// 3. Upload
/// 4. Submit in file mode
/// 5. Poll until terminal or timeout
/// 6. Download results if the job succeeded
///
/// A failed, cancelled or expired job is returned as an outcome, not an
/// error; only setup failures and polling timeouts abort.
#[instrument(skip_all, fields(source = %config.source.display(), kind = %target.kind()))]
async fn run_workflow(
    api: &dyn BatchApi,
    config: &WorkflowConfig,
    target: TargetSchema,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    let start = Instant::now();
    let kind = target.kind();

    // --- Phase 1: Prepare JSONL ---
    let format = SourceFormat::from_path(&config.source);
    let (jsonl_path, ingestion) = match format {
        SourceFormat::Jsonl => (config.source.clone(), None),
        f if f.is_convertible() => {
            progress.phase("Converting source to JSONL");
            let output = converted_path(&config.source, &config.output_dir, kind.as_str());
            std::fs::create_dir_all(&config.output_dir)
                .map_err(|e| GembatchError::io(&config.output_dir, e))?;
            let report = convert_to_jsonl(&ConvertOptions {
                source: config.source.clone(),
                output: output.clone(),
                target,
            })?;
            if !report.validation_passed {
                return Err(GembatchError::ValidationFailed {
                    errors: report.errors,
                });
            }
            (output, Some(report))
        }
        f => {
            return Err(GembatchError::UnsupportedFormat {
                format: f.as_str().to_string(),
                path: config.source.clone(),
            });
        }
    };

    // --- Phase 2: Validate ---
    progress.phase("Validating requests");
    let mut validation = validate_for_kind(&jsonl_path, kind)?.into_result()?;
    if validation.request_count == 0 {
        return Err(GembatchError::ValidationFailed {
            errors: vec![NO_REQUESTS.to_string()],
        });
    }
    if let (None, TargetSchema::Embedding(task_type)) = (&ingestion, target) {
        let mismatched = count_other_task_types(&jsonl_path, task_type)?;
        if mismatched > 0 {
            warn!(
                expected = %task_type,
                records = mismatched,
                "JSONL records name a different task_type"
            );
            validation.warnings.push(format!(
                "{mismatched} record(s) use a task_type other than {task_type}"
            ));
        }
    }
    info!(requests = validation.request_count, "requests validated");

    // --- Phase 3: Upload ---
    progress.phase("Uploading request file");
    let uploaded_file = api
        .upload_file(&jsonl_path, JSONL_MIME_TYPE, config.display_name.as_deref())
        .await?;

    // --- Phase 4: Submit ---
    progress.phase("Submitting batch job");
    let job = submit_job(
        api,
        SubmitRequest {
            kind,
            model: config.model.clone(),
            inline_requests: None,
            file_name: Some(uploaded_file.name.clone()),
            options: JobConfig {
                display_name: config.display_name.clone(),
            },
        },
    )
    .await?;

    // --- Phase 5: Poll ---
    progress.phase("Waiting for job to finish");
    let polled = poll_job(
        api,
        &job.name,
        PollMode::Until {
            interval: config.poll_interval,
            timeout: config.poll_timeout,
        },
        progress,
    )
    .await?;

    // --- Phase 6: Results ---
    let results = if polled.job.state == JobState::Succeeded {
        progress.phase("Downloading results");
        Some(download_results(api, &polled.job, &config.output_dir).await?)
    } else {
        warn!(
            job = %polled.job.name,
            state = %polled.job.state,
            error = ?polled.job.error,
            "job did not succeed; skipping result download"
        );
        None
    };

    let outcome = WorkflowOutcome {
        job: polled.job,
        ingestion,
        validation,
        uploaded_file,
        results,
        polls: polled.polls,
        elapsed: start.elapsed(),
    };
    progress.done(&outcome);
    Ok(outcome)
}

/// Records of an already-validated embedding file whose task type differs.
fn count_other_task_types(path: &Path, expected: TaskType) -> Result<usize> {
    let content = std::fs::read_to_string(path).map_err(|e| GembatchError::io(path, e))?;
    let count = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .filter(|v| {
            v.pointer("/request/task_type")
                .and_then(serde_json::Value::as_str)
                .is_some_and(|t| !t.eq_ignore_ascii_case(expected.as_str()))
        })
        .count();
    Ok(count)
}

fn converted_path(source: &Path, output_dir: &Path, kind: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string());
    output_dir.join(format!("{stem}_{kind}_requests.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FAKE_UPLOAD, FakeBatchApi, job, succeeded_file, succeeded_inline, temp_dir};
    use crate::progress::SilentProgress;
    use gembatch_shared::{InlinedResponse, JobKind};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn config(dir: &Path, source: PathBuf) -> WorkflowConfig {
        WorkflowConfig {
            source,
            model: "gemini-2.5-flash".into(),
            output_dir: dir.join("out"),
            poll_interval: Duration::from_millis(5),
            poll_timeout: Duration::from_secs(5),
            display_name: Some("wf-test".into()),
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
        done: Mutex<bool>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn job_polled(&self, _job: &BatchJob, _polls: usize, _elapsed: Duration) {}
        fn done(&self, _outcome: &WorkflowOutcome) {
            *self.done.lock().unwrap() = true;
        }
    }

    #[tokio::test]
    async fn text_source_runs_end_to_end() {
        let dir = temp_dir("gb-wf-text");
        let source = dir.join("prompts.txt");
        std::fs::write(&source, "first prompt\n\nsecond prompt\n").unwrap();

        let results = "{\"key\":\"request-1\",\"response\":{}}\n{\"key\":\"request-2\",\"response\":{}}\n";
        let api = FakeBatchApi::new()
            .running_then(2, succeeded_file("files/out-1"))
            .with_file("files/out-1", results.as_bytes());
        let progress = RecordingProgress::default();

        let outcome = run_content_workflow(&api, &config(&dir, source), &progress)
            .await
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.polls, 3);
        assert_eq!(outcome.validation.request_count, 2);
        assert_eq!(outcome.uploaded_file.name, FAKE_UPLOAD);
        assert_eq!(outcome.results.as_ref().unwrap().results.len(), 2);

        let ingestion = outcome.ingestion.as_ref().unwrap();
        assert!(ingestion.output_file.ends_with("prompts_content_requests.jsonl"));
        assert_eq!(api.uploads.lock().unwrap()[0], ingestion.output_file);

        let created = api.created.lock().unwrap();
        assert_eq!(created[0].kind, JobKind::Content);
        assert_eq!(created[0].src, Some(json!(FAKE_UPLOAD)));
        assert_eq!(created[0].config.display_name.as_deref(), Some("wf-test"));

        assert_eq!(progress.phases.lock().unwrap().len(), 6);
        assert!(*progress.done.lock().unwrap());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn embeddings_workflow_applies_task_type() {
        let dir = temp_dir("gb-wf-embed");
        let source = dir.join("docs.json");
        std::fs::write(&source, r#"["alpha", "beta"]"#).unwrap();

        let api = FakeBatchApi::new().with_progression(vec![succeeded_inline(vec![
            InlinedResponse {
                key: Some("request-1".into()),
                response: Some(json!({"embedding": {"values": [0.5]}})),
                error: None,
            },
        ])]);

        let outcome = run_embeddings_workflow(
            &api,
            &config(&dir, source),
            TaskType::Clustering,
            &SilentProgress,
        )
        .await
        .unwrap();
        assert!(outcome.succeeded());

        let written =
            std::fs::read_to_string(&outcome.ingestion.as_ref().unwrap().output_file).unwrap();
        let first: Value = serde_json::from_str(written.lines().next().unwrap()).unwrap();
        assert_eq!(first["request"]["task_type"], "CLUSTERING");

        let created = api.created.lock().unwrap();
        assert_eq!(created[0].kind, JobKind::Embedding);
        assert_eq!(created[0].src, Some(json!({"file_name": FAKE_UPLOAD})));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn jsonl_source_skips_conversion() {
        let dir = temp_dir("gb-wf-jsonl");
        let source = dir.join("requests.jsonl");
        std::fs::write(
            &source,
            "{\"key\":\"a\",\"request\":{\"contents\":[{\"parts\":[{\"text\":\"hi\"}]}]}}\n",
        )
        .unwrap();

        let api = FakeBatchApi::new().with_progression(vec![job(JobState::Failed)]);
        let outcome = run_content_workflow(&api, &config(&dir, source.clone()), &SilentProgress)
            .await
            .unwrap();

        assert!(outcome.ingestion.is_none());
        assert_eq!(api.uploads.lock().unwrap()[0], source);
        assert_eq!(outcome.job.state, JobState::Failed);
        assert!(outcome.results.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn invalid_jsonl_stops_before_upload() {
        let dir = temp_dir("gb-wf-invalid");
        let source = dir.join("requests.jsonl");
        std::fs::write(&source, "{\"key\":\"a\"}\nnot json\n").unwrap();

        let api = FakeBatchApi::new();
        let err = run_content_workflow(&api, &config(&dir, source), &SilentProgress)
            .await
            .unwrap_err();
        match err {
            GembatchError::ValidationFailed { errors } => assert!(errors.len() >= 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(api.uploads.lock().unwrap().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn embedding_jsonl_without_task_type_is_rejected() {
        let dir = temp_dir("gb-wf-embed-jsonl");
        let source = dir.join("requests.jsonl");
        std::fs::write(
            &source,
            "{\"key\":\"a\",\"request\":{\"content\":{\"parts\":[{\"text\":\"x\"}]}}}\n",
        )
        .unwrap();

        let api = FakeBatchApi::new();
        let err = run_embeddings_workflow(
            &api,
            &config(&dir, source),
            TaskType::RetrievalDocument,
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GembatchError::ValidationFailed { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn embedding_jsonl_with_other_task_type_warns() {
        let dir = temp_dir("gb-wf-embed-mismatch");
        let source = dir.join("requests.jsonl");
        std::fs::write(
            &source,
            concat!(
                "{\"key\":\"a\",\"request\":{\"content\":{\"parts\":[{\"text\":\"x\"}]},\"task_type\":\"CLASSIFICATION\"}}\n",
                "{\"key\":\"b\",\"request\":{\"content\":{\"parts\":[{\"text\":\"y\"}]},\"task_type\":\"CLUSTERING\"}}\n",
            ),
        )
        .unwrap();

        let api = FakeBatchApi::new().with_progression(vec![job(JobState::Cancelled)]);
        let outcome = run_embeddings_workflow(
            &api,
            &config(&dir, source),
            TaskType::Clustering,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(
            outcome
                .validation
                .warnings
                .iter()
                .any(|w| w.starts_with("1 record(s) use a task_type other than CLUSTERING")),
            "{:?}",
            outcome.validation.warnings
        );
        assert_eq!(api.created.lock().unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn empty_source_stops_before_upload() {
        let dir = temp_dir("gb-wf-empty");
        let source = dir.join("prompts.csv");
        std::fs::write(&source, "prompt\n").unwrap();

        let api = FakeBatchApi::new();
        let err = run_content_workflow(&api, &config(&dir, source), &SilentProgress)
            .await
            .unwrap_err();
        match err {
            GembatchError::ValidationFailed { errors } => {
                assert_eq!(errors, vec![NO_REQUESTS.to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(api.uploads.lock().unwrap().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn create_rejection_aborts_after_upload() {
        let dir = temp_dir("gb-wf-create-fail");
        let source = dir.join("prompts.txt");
        std::fs::write(&source, "one\ntwo\n").unwrap();

        let api = FakeBatchApi::new().failing_create("quota exceeded");
        let progress = RecordingProgress::default();
        let err = run_content_workflow(&api, &config(&dir, source), &progress)
            .await
            .unwrap_err();

        match err {
            GembatchError::RemoteOperationFailed { message, .. } => {
                assert!(message.contains("quota exceeded"), "{message}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(api.uploads.lock().unwrap().len(), 1);
        assert_eq!(api.gets(), 0);
        assert!(!*progress.done.lock().unwrap());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn polling_timeout_aborts_without_download() {
        let dir = temp_dir("gb-wf-timeout");
        let source = dir.join("prompts.txt");
        std::fs::write(&source, "one\n").unwrap();

        let api = FakeBatchApi::new().with_progression(vec![job(JobState::Running)]);
        let mut cfg = config(&dir, source);
        cfg.poll_timeout = Duration::from_millis(30);
        let progress = RecordingProgress::default();

        let err = run_content_workflow(&api, &cfg, &progress).await.unwrap_err();
        assert!(matches!(err, GembatchError::PollingTimeout { .. }), "{err:?}");
        assert!(api.gets() >= 2);
        assert!(
            !progress
                .phases
                .lock()
                .unwrap()
                .iter()
                .any(|p| p.starts_with("Downloading"))
        );
        assert!(!*progress.done.lock().unwrap());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn unsupported_source_format() {
        let dir = temp_dir("gb-wf-unsupported");
        let source = dir.join("data.xml");
        std::fs::write(&source, "<a/>").unwrap();

        let err = run_content_workflow(&FakeBatchApi::new(), &config(&dir, source), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, GembatchError::UnsupportedFormat { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }
}
