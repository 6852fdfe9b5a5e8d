//! Named-tool surface over the batch pipeline.
//!
//! Each tool takes a flat JSON object of named parameters and returns a JSON
//! value. Routing tool calls from a transport (stdio, HTTP) is left to the
//! caller; [`BatchTools::call`] is the single dispatch point.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{info, instrument};

use gembatch_ingest::{
    ingest_content, ingest_embeddings, recommend_task_type, validate_jsonl,
};
use gembatch_shared::{
    AppConfig, BatchApi, GembatchError, JSONL_MIME_TYPE, JobConfig, JobKind, Result, TaskType,
};

use crate::download::download_results;
use crate::poll::{PollMode, poll_job};
use crate::progress::{ProgressReporter, SilentProgress};
use crate::submit::{SubmitRequest, cancel_job, delete_job, submit_job};
use crate::workflow::{WorkflowConfig, run_content_workflow, run_embeddings_workflow};

/// Fallback values for parameters a tool call leaves out.
#[derive(Debug, Clone)]
pub struct ToolDefaults {
    pub content_model: String,
    pub embedding_model: String,
    pub output_dir: PathBuf,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl ToolDefaults {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            content_model: config.gemini.default_model.clone(),
            embedding_model: config.gemini.embedding_model.clone(),
            output_dir: PathBuf::from(&config.batch.output_dir),
            poll_interval: config.batch.poll_interval(),
            poll_timeout: config.batch.poll_timeout(),
        }
    }
}

/// A tool name, its purpose and the JSON schema of its parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Dispatches tool calls to the pipeline stages.
pub struct BatchTools {
    api: Arc<dyn BatchApi>,
    defaults: ToolDefaults,
    progress: Arc<dyn ProgressReporter>,
}

// ---------------------------------------------------------------------------
// Tool parameters
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct IngestArgs {
    input_file: PathBuf,
    output_file: Option<PathBuf>,
    task_type: Option<String>,
}

#[derive(Deserialize)]
struct FileArgs {
    file_path: PathBuf,
}

#[derive(Deserialize)]
struct UploadArgs {
    file_path: PathBuf,
    display_name: Option<String>,
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct CreateArgs {
    model: Option<String>,
    input_file_name: Option<String>,
    inline_requests: Option<Vec<Value>>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct StatusArgs {
    batch_name: String,
    #[serde(default)]
    poll: bool,
    poll_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
struct DownloadArgs {
    batch_name: String,
    output_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
struct NameArgs {
    batch_name: String,
}

#[derive(Deserialize)]
struct QueryTaskTypeArgs {
    context: String,
    #[serde(default)]
    sample_texts: Vec<String>,
}

#[derive(Deserialize)]
struct WorkflowArgs {
    input_file: PathBuf,
    model: Option<String>,
    output_dir: Option<PathBuf>,
    display_name: Option<String>,
    task_type: Option<String>,
    poll_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

impl BatchTools {
    pub fn new(api: Arc<dyn BatchApi>, defaults: ToolDefaults) -> Self {
        Self {
            api,
            defaults,
            progress: Arc::new(SilentProgress),
        }
    }

    /// Report workflow and polling progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn defaults(&self) -> &ToolDefaults {
        &self.defaults
    }

    /// Invoke the tool `name` with a JSON object of parameters.
    #[instrument(skip(self, args))]
    pub async fn call(&self, name: &str, args: Value) -> Result<Value> {
        let args = if args.is_null() { json!({}) } else { args };
        let api = self.api.as_ref();

        let result = match name {
            "batch_ingest_content" => {
                let a: IngestArgs = parse_args(name, args)?;
                let output = a
                    .output_file
                    .unwrap_or_else(|| default_output(&a.input_file, "content"));
                to_json(&ingest_content(&a.input_file, &output)?)
            }
            "batch_ingest_embeddings" => {
                let a: IngestArgs = parse_args(name, args)?;
                let task_type = parse_task_type(a.task_type.as_deref())?;
                let output = a
                    .output_file
                    .unwrap_or_else(|| default_output(&a.input_file, "embedding"));
                to_json(&ingest_embeddings(&a.input_file, &output, task_type)?)
            }
            "batch_validate_jsonl" => {
                let a: FileArgs = parse_args(name, args)?;
                to_json(&validate_jsonl(&a.file_path)?)
            }
            "batch_upload_file" => {
                let a: UploadArgs = parse_args(name, args)?;
                if !a.file_path.is_file() {
                    return Err(GembatchError::invalid_params(format!(
                        "file not found: {}",
                        a.file_path.display()
                    )));
                }
                let mime_type = a.mime_type.as_deref().unwrap_or(JSONL_MIME_TYPE);
                to_json(
                    &api.upload_file(&a.file_path, mime_type, a.display_name.as_deref())
                        .await?,
                )
            }
            "batch_create" => self.create(name, args, JobKind::Content).await,
            "batch_create_embeddings" => self.create(name, args, JobKind::Embedding).await,
            "batch_get_status" => {
                let a: StatusArgs = parse_args(name, args)?;
                let mode = if a.poll {
                    PollMode::Until {
                        interval: secs_or(a.poll_interval_secs, self.defaults.poll_interval),
                        timeout: secs_or(a.timeout_secs, self.defaults.poll_timeout),
                    }
                } else {
                    PollMode::Once
                };
                to_json(&poll_job(api, &a.batch_name, mode, self.progress.as_ref()).await?)
            }
            "batch_download_results" => {
                let a: DownloadArgs = parse_args(name, args)?;
                let job = poll_job(api, &a.batch_name, PollMode::Once, &SilentProgress)
                    .await?
                    .job;
                let output_dir = a.output_dir.unwrap_or_else(|| self.defaults.output_dir.clone());
                let downloaded = download_results(api, &job, &output_dir).await?;
                Ok(json!({
                    "batch_name": &downloaded.job,
                    "file_path": &downloaded.file_path,
                    "format": downloaded.format,
                    "result_count": downloaded.results.len(),
                    "success_count": downloaded.success_count(),
                    "error_count": downloaded.error_count(),
                    "results": &downloaded.results,
                }))
            }
            "batch_cancel" => {
                let a: NameArgs = parse_args(name, args)?;
                cancel_job(api, &a.batch_name).await?;
                Ok(json!({ "batch_name": a.batch_name, "cancel_requested": true }))
            }
            "batch_delete" => {
                let a: NameArgs = parse_args(name, args)?;
                delete_job(api, &a.batch_name).await?;
                Ok(json!({ "batch_name": a.batch_name, "deleted": true }))
            }
            "batch_query_task_type" => {
                let a: QueryTaskTypeArgs = parse_args(name, args)?;
                to_json(&recommend_task_type(&a.context, &a.sample_texts))
            }
            "batch_list_task_types" => Ok(json!({
                "task_types": TaskType::ALL
                    .iter()
                    .map(|t| json!({ "task_type": t, "description": t.description() }))
                    .collect::<Vec<_>>(),
            })),
            "batch_process_workflow" => {
                let a: WorkflowArgs = parse_args(name, args)?;
                let config = self.workflow_config(a, &self.defaults.content_model);
                to_json(&run_content_workflow(api, &config, self.progress.as_ref()).await?)
            }
            "batch_process_embeddings_workflow" => {
                let a: WorkflowArgs = parse_args(name, args)?;
                let task_type = parse_task_type(a.task_type.as_deref())?.ok_or_else(|| {
                    GembatchError::invalid_params(
                        "task_type is required (see batch_query_task_type)",
                    )
                })?;
                let config = self.workflow_config(a, &self.defaults.embedding_model);
                to_json(
                    &run_embeddings_workflow(api, &config, task_type, self.progress.as_ref())
                        .await?,
                )
            }
            other => Err(GembatchError::invalid_params(format!("unknown tool `{other}`"))),
        }?;

        info!(tool = name, "tool call completed");
        Ok(result)
    }

    async fn create(&self, name: &str, args: Value, kind: JobKind) -> Result<Value> {
        let a: CreateArgs = parse_args(name, args)?;
        let model = a.model.unwrap_or_else(|| match kind {
            JobKind::Content => self.defaults.content_model.clone(),
            JobKind::Embedding => self.defaults.embedding_model.clone(),
        });
        let job = submit_job(
            self.api.as_ref(),
            SubmitRequest {
                kind,
                model,
                inline_requests: a.inline_requests,
                file_name: a.input_file_name,
                options: JobConfig {
                    display_name: a.display_name,
                },
            },
        )
        .await?;
        to_json(&job)
    }

    fn workflow_config(&self, a: WorkflowArgs, default_model: &str) -> WorkflowConfig {
        WorkflowConfig {
            source: a.input_file,
            model: a.model.unwrap_or_else(|| default_model.to_string()),
            output_dir: a.output_dir.unwrap_or_else(|| self.defaults.output_dir.clone()),
            poll_interval: secs_or(a.poll_interval_secs, self.defaults.poll_interval),
            poll_timeout: secs_or(a.timeout_secs, self.defaults.poll_timeout),
            display_name: a.display_name,
        }
    }

    /// Every tool with its parameter schema.
    pub fn definitions() -> Vec<ToolDefinition> {
        let ingest_schema = |with_task_type: bool| {
            let mut props = json!({
                "input_file": { "type": "string", "description": "Source file (CSV, JSON, TXT or JSONL)" },
                "output_file": { "type": "string", "description": "JSONL output path" },
            });
            if with_task_type {
                props["task_type"] = task_type_schema();
            }
            let required = if with_task_type {
                json!(["input_file", "task_type"])
            } else {
                json!(["input_file"])
            };
            object_schema(props, required)
        };
        let create_schema = || {
            object_schema(
                json!({
                    "model": { "type": "string" },
                    "input_file_name": { "type": "string", "description": "Uploaded file handle (files/...)" },
                    "inline_requests": { "type": "array", "items": { "type": "object" } },
                    "display_name": { "type": "string" },
                }),
                json!([]),
            )
        };
        let batch_name = || {
            object_schema(
                json!({ "batch_name": { "type": "string", "description": "Job handle (batches/...)" } }),
                json!(["batch_name"]),
            )
        };
        let workflow_schema = |with_task_type: bool| {
            let mut props = json!({
                "input_file": { "type": "string" },
                "model": { "type": "string" },
                "output_dir": { "type": "string" },
                "display_name": { "type": "string" },
                "poll_interval_secs": { "type": "integer", "minimum": 1 },
                "timeout_secs": { "type": "integer", "minimum": 1 },
            });
            if with_task_type {
                props["task_type"] = task_type_schema();
            }
            let required = if with_task_type {
                json!(["input_file", "task_type"])
            } else {
                json!(["input_file"])
            };
            object_schema(props, required)
        };

        vec![
            ToolDefinition {
                name: "batch_ingest_content",
                description: "Convert a source file into content-generation JSONL requests",
                input_schema: ingest_schema(false),
            },
            ToolDefinition {
                name: "batch_ingest_embeddings",
                description: "Convert a source file into embedding JSONL requests",
                input_schema: ingest_schema(true),
            },
            ToolDefinition {
                name: "batch_validate_jsonl",
                description: "Validate a JSONL request file line by line",
                input_schema: object_schema(
                    json!({ "file_path": { "type": "string" } }),
                    json!(["file_path"]),
                ),
            },
            ToolDefinition {
                name: "batch_upload_file",
                description: "Upload a file to the provider file store",
                input_schema: object_schema(
                    json!({
                        "file_path": { "type": "string" },
                        "display_name": { "type": "string" },
                        "mime_type": { "type": "string", "default": JSONL_MIME_TYPE },
                    }),
                    json!(["file_path"]),
                ),
            },
            ToolDefinition {
                name: "batch_create",
                description: "Create a content-generation batch job from a file or inline requests",
                input_schema: create_schema(),
            },
            ToolDefinition {
                name: "batch_create_embeddings",
                description: "Create an embedding batch job from a file or inline requests",
                input_schema: create_schema(),
            },
            ToolDefinition {
                name: "batch_get_status",
                description: "Fetch a job's status, optionally waiting until it finishes",
                input_schema: object_schema(
                    json!({
                        "batch_name": { "type": "string" },
                        "poll": { "type": "boolean", "default": false },
                        "poll_interval_secs": { "type": "integer", "minimum": 1 },
                        "timeout_secs": { "type": "integer", "minimum": 1 },
                    }),
                    json!(["batch_name"]),
                ),
            },
            ToolDefinition {
                name: "batch_download_results",
                description: "Download and save the results of a finished job",
                input_schema: object_schema(
                    json!({
                        "batch_name": { "type": "string" },
                        "output_dir": { "type": "string" },
                    }),
                    json!(["batch_name"]),
                ),
            },
            ToolDefinition {
                name: "batch_cancel",
                description: "Request cancellation of a running job",
                input_schema: batch_name(),
            },
            ToolDefinition {
                name: "batch_delete",
                description: "Delete a job",
                input_schema: batch_name(),
            },
            ToolDefinition {
                name: "batch_query_task_type",
                description: "Suggest an embedding task type for a described use case",
                input_schema: object_schema(
                    json!({
                        "context": { "type": "string" },
                        "sample_texts": { "type": "array", "items": { "type": "string" } },
                    }),
                    json!(["context"]),
                ),
            },
            ToolDefinition {
                name: "batch_list_task_types",
                description: "List the supported embedding task types",
                input_schema: object_schema(json!({}), json!([])),
            },
            ToolDefinition {
                name: "batch_process_workflow",
                description: "Convert, validate, upload, submit, wait for and download a content batch",
                input_schema: workflow_schema(false),
            },
            ToolDefinition {
                name: "batch_process_embeddings_workflow",
                description: "Run the full pipeline for an embedding batch",
                input_schema: workflow_schema(true),
            },
        ]
    }
}

/// `{"error": {"kind", "message"}}` body for reporting a failed call.
pub fn error_payload(err: &GembatchError) -> Value {
    let mut body = json!({ "kind": err.kind(), "message": err.to_string() });
    if let GembatchError::ValidationFailed { errors } = err {
        body["errors"] = json!(errors);
    }
    json!({ "error": body })
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| GembatchError::invalid_params(format!("{tool}: {e}")))
}

fn parse_task_type(raw: Option<&str>) -> Result<Option<TaskType>> {
    raw.map(str::parse::<TaskType>).transpose()
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| GembatchError::parse(e.to_string()))
}

fn secs_or(secs: Option<u64>, default: Duration) -> Duration {
    secs.map(Duration::from_secs).unwrap_or(default)
}

fn object_schema(properties: Value, required: Value) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

fn task_type_schema() -> Value {
    json!({
        "type": "string",
        "enum": TaskType::ALL.map(|t| t.as_str()),
    })
}

/// `{dir}/{stem}_{kind}_requests.jsonl` next to the input.
fn default_output(input: &Path, kind: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "requests".to_string());
    input.with_file_name(format!("{stem}_{kind}_requests.jsonl"))
}
