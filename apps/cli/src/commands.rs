//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use gembatch_core::{
    BatchTools, DownloadedResults, PollMode, PollOutcome, ProgressReporter, SubmitRequest,
    ToolDefaults, WorkflowConfig, WorkflowOutcome,
};
use gembatch_gemini::{GeminiClient, GeminiClientConfig};
use gembatch_ingest::{IngestionReport, ValidationReport};
use gembatch_shared::{
    AppConfig, BatchApi, BatchJob, JSONL_MIME_TYPE, JobConfig, JobKind, TaskType, init_config,
    load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// gembatch — run Gemini batch jobs from local files.
#[derive(Parser)]
#[command(
    name = "gembatch",
    version,
    about = "Convert local files into Gemini batch jobs, track them and collect the results.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Show the detected format and structure of a source file.
    Detect {
        /// Source file.
        input: PathBuf,
    },

    /// Convert a source file (CSV, JSON, TXT, JSONL) into a JSONL request file.
    Ingest {
        /// Source file.
        input: PathBuf,

        /// Output JSONL path (defaults to `<stem>_<kind>_requests.jsonl` next to the input).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Produce embedding requests instead of content-generation requests.
        #[arg(long)]
        embeddings: bool,

        /// Embedding task type (required with --embeddings).
        #[arg(long)]
        task_type: Option<String>,
    },

    /// Validate a JSONL request file.
    Validate {
        /// JSONL file.
        file: PathBuf,

        /// Check strictly against one job kind: content or embedding.
        #[arg(long)]
        kind: Option<KindArg>,
    },

    /// Upload a file to the Gemini file store.
    Upload {
        /// File to upload.
        file: PathBuf,

        #[arg(long)]
        display_name: Option<String>,

        #[arg(long, default_value = JSONL_MIME_TYPE)]
        mime_type: String,
    },

    /// Create a batch job from an uploaded file or inline requests.
    Submit {
        /// Create an embedding job.
        #[arg(long)]
        embeddings: bool,

        /// Model (defaults to the configured model for the job kind).
        #[arg(short, long)]
        model: Option<String>,

        /// Uploaded file handle (files/...).
        #[arg(long, conflicts_with = "inline")]
        file_name: Option<String>,

        /// JSON file holding an array of inline requests.
        #[arg(long)]
        inline: Option<PathBuf>,

        #[arg(long)]
        display_name: Option<String>,
    },

    /// Show a job's status.
    Status {
        /// Job handle (batches/...).
        name: String,

        /// Keep polling until the job finishes.
        #[arg(short, long)]
        wait: bool,

        /// Seconds between polls (with --wait).
        #[arg(long)]
        interval: Option<u64>,

        /// Give up after this many seconds (with --wait).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Download the results of a finished job.
    Download {
        /// Job handle (batches/...).
        name: String,

        /// Output directory (defaults to batch.output_dir).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Request cancellation of a job.
    Cancel {
        name: String,
    },

    /// Delete a job.
    Delete {
        name: String,
    },

    /// Suggest an embedding task type for a use case.
    Advise {
        /// Description of what the embeddings are for.
        context: String,

        /// Sample texts (repeatable).
        #[arg(long = "sample")]
        samples: Vec<String>,
    },

    /// List embedding task types.
    TaskTypes,

    /// Convert, validate, upload, submit, wait for and download a batch.
    Run {
        /// Source file.
        input: PathBuf,

        /// Run an embedding batch.
        #[arg(long)]
        embeddings: bool,

        /// Embedding task type (required with --embeddings).
        #[arg(long)]
        task_type: Option<String>,

        #[arg(short, long)]
        model: Option<String>,

        /// Output directory for artifacts and results.
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long)]
        display_name: Option<String>,

        /// Seconds between polls.
        #[arg(long)]
        interval: Option<u64>,

        /// Give up after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Inspect or invoke the named tools.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Job kind selector for `validate --kind`.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum KindArg {
    Content,
    Embedding,
}

impl From<KindArg> for JobKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Content => JobKind::Content,
            KindArg::Embedding => JobKind::Embedding,
        }
    }
}

/// Tool subcommands.
#[derive(Subcommand)]
pub(crate) enum ToolsAction {
    /// List tools and their parameter schemas.
    List,
    /// Call a tool with JSON arguments.
    Call {
        /// Tool name, e.g. batch_get_status.
        name: String,

        /// JSON object of named parameters.
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "gembatch=info",
        1 => "gembatch=debug",
        _ => "gembatch=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Detect { input } => cmd_detect(&input),
        Command::Ingest {
            input,
            output,
            embeddings,
            task_type,
        } => cmd_ingest(&input, output, embeddings, task_type.as_deref()),
        Command::Validate { file, kind } => cmd_validate(&file, kind.map(JobKind::from)),
        Command::Upload {
            file,
            display_name,
            mime_type,
        } => cmd_upload(&file, display_name.as_deref(), &mime_type).await,
        Command::Submit {
            embeddings,
            model,
            file_name,
            inline,
            display_name,
        } => cmd_submit(embeddings, model, file_name, inline.as_deref(), display_name).await,
        Command::Status {
            name,
            wait,
            interval,
            timeout,
        } => cmd_status(&name, wait, interval, timeout).await,
        Command::Download { name, out } => cmd_download(&name, out).await,
        Command::Cancel { name } => cmd_cancel(&name).await,
        Command::Delete { name } => cmd_delete(&name).await,
        Command::Advise { context, samples } => cmd_advise(&context, &samples),
        Command::TaskTypes => cmd_task_types(),
        Command::Run {
            input,
            embeddings,
            task_type,
            model,
            out,
            display_name,
            interval,
            timeout,
        } => {
            let opts = RunOptions {
                input,
                task_type,
                model,
                out,
                display_name,
                interval,
                timeout,
            };
            cmd_run(opts, embeddings).await
        }
        Command::Tools { action } => match action {
            ToolsAction::List => cmd_tools_list(),
            ToolsAction::Call { name, args } => cmd_tools_call(&name, &args).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Build the Gemini client from config. Only commands that talk to the
/// provider need an API key.
fn connect(config: &AppConfig) -> Result<Arc<dyn BatchApi>> {
    let client = GeminiClient::new(GeminiClientConfig::from_app_config(config)?)?;
    Ok(Arc::new(client))
}

fn parse_task_type(raw: Option<&str>) -> Result<Option<TaskType>> {
    Ok(raw.map(str::parse::<TaskType>).transpose()?)
}

fn default_output(input: &Path, kind: JobKind) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "requests".to_string());
    input.with_file_name(format!("{stem}_{kind}_requests.jsonl"))
}

fn secs_or(secs: Option<u64>, default: Duration) -> Duration {
    secs.map(Duration::from_secs).unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Ingestion commands (local only)
// ---------------------------------------------------------------------------

fn cmd_detect(input: &Path) -> Result<()> {
    let descriptor = gembatch_ingest::detect_format(input)?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}

fn cmd_ingest(
    input: &Path,
    output: Option<PathBuf>,
    embeddings: bool,
    task_type: Option<&str>,
) -> Result<()> {
    let kind = if embeddings {
        JobKind::Embedding
    } else {
        JobKind::Content
    };
    let output = output.unwrap_or_else(|| default_output(input, kind));

    info!(input = %input.display(), output = %output.display(), %kind, "ingesting source");

    let report = if embeddings {
        gembatch_ingest::ingest_embeddings(input, &output, parse_task_type(task_type)?)?
    } else {
        gembatch_ingest::ingest_content(input, &output)?
    };

    print_ingestion(&report);
    if !report.validation_passed {
        return Err(eyre!("ingestion failed validation"));
    }
    Ok(())
}

fn cmd_validate(file: &Path, kind: Option<JobKind>) -> Result<()> {
    let report = match kind {
        Some(kind) => gembatch_ingest::validate_for_kind(file, kind)?,
        None => gembatch_ingest::validate_jsonl(file)?,
    };
    print_validation(&report);
    if !report.valid {
        return Err(eyre!("{} error(s) in {}", report.errors.len(), file.display()));
    }
    Ok(())
}

fn cmd_advise(context: &str, samples: &[String]) -> Result<()> {
    let rec = gembatch_ingest::recommend_task_type(context, samples);
    println!();
    println!("  Task type:  {}", rec.selected_task_type);
    println!("  Confidence: {:.0}%", rec.confidence * 100.0);
    println!("  Reasoning:  {}", rec.reasoning);
    println!();
    Ok(())
}

fn cmd_task_types() -> Result<()> {
    for task_type in TaskType::ALL {
        println!("  {:<22} {}", task_type.as_str(), task_type.description());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Job commands
// ---------------------------------------------------------------------------

async fn cmd_upload(file: &Path, display_name: Option<&str>, mime_type: &str) -> Result<()> {
    if !file.is_file() {
        return Err(eyre!("file not found: {}", file.display()));
    }
    let config = load_config()?;
    let api = connect(&config)?;

    let uploaded = api.upload_file(file, mime_type, display_name).await?;
    println!("{}", uploaded.name);
    Ok(())
}

async fn cmd_submit(
    embeddings: bool,
    model: Option<String>,
    file_name: Option<String>,
    inline: Option<&Path>,
    display_name: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let kind = if embeddings {
        JobKind::Embedding
    } else {
        JobKind::Content
    };
    let model = model.unwrap_or_else(|| match kind {
        JobKind::Content => config.gemini.default_model.clone(),
        JobKind::Embedding => config.gemini.embedding_model.clone(),
    });

    let inline_requests = match inline {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading {}", path.display()))?;
            let requests: Vec<Value> = serde_json::from_str(&raw)
                .wrap_err_with(|| format!("{} must hold a JSON array", path.display()))?;
            Some(requests)
        }
        None => None,
    };

    let api = connect(&config)?;
    let job = gembatch_core::submit_job(
        api.as_ref(),
        SubmitRequest {
            kind,
            model,
            inline_requests,
            file_name,
            options: JobConfig { display_name },
        },
    )
    .await?;

    print_job(&job);
    Ok(())
}

async fn cmd_status(
    name: &str,
    wait: bool,
    interval: Option<u64>,
    timeout: Option<u64>,
) -> Result<()> {
    let config = load_config()?;
    let api = connect(&config)?;

    let outcome: PollOutcome = if wait {
        let mode = PollMode::Until {
            interval: secs_or(interval, config.batch.poll_interval()),
            timeout: secs_or(timeout, config.batch.poll_timeout()),
        };
        let reporter = CliProgress::new();
        let outcome = gembatch_core::poll_job(api.as_ref(), name, mode, &reporter).await;
        reporter.finish();
        outcome?
    } else {
        gembatch_core::poll_job(api.as_ref(), name, PollMode::Once, &gembatch_core::SilentProgress)
            .await?
    };

    print_job(&outcome.job);
    Ok(())
}

async fn cmd_download(name: &str, out: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let api = connect(&config)?;
    let output_dir = out.unwrap_or_else(|| PathBuf::from(&config.batch.output_dir));

    let job = api.get_job(name).await?;
    let downloaded = gembatch_core::download_results(api.as_ref(), &job, &output_dir).await?;
    print_results(&downloaded);
    Ok(())
}

async fn cmd_cancel(name: &str) -> Result<()> {
    let config = load_config()?;
    let api = connect(&config)?;
    gembatch_core::cancel_job(api.as_ref(), name).await?;
    println!("Cancellation requested for {name}");
    Ok(())
}

async fn cmd_delete(name: &str) -> Result<()> {
    let config = load_config()?;
    let api = connect(&config)?;
    gembatch_core::delete_job(api.as_ref(), name).await?;
    println!("Deleted {name}");
    Ok(())
}

/// Arguments shared by both `run` variants.
struct RunOptions {
    input: PathBuf,
    task_type: Option<String>,
    model: Option<String>,
    out: Option<PathBuf>,
    display_name: Option<String>,
    interval: Option<u64>,
    timeout: Option<u64>,
}

async fn cmd_run(opts: RunOptions, embeddings: bool) -> Result<()> {
    let config = load_config()?;
    let task_type = if embeddings {
        Some(parse_task_type(opts.task_type.as_deref())?.ok_or_else(|| {
            eyre!("--task-type is required with --embeddings (see `gembatch advise`)")
        })?)
    } else {
        None
    };
    let default_model = if embeddings {
        &config.gemini.embedding_model
    } else {
        &config.gemini.default_model
    };

    let workflow = WorkflowConfig {
        source: opts.input,
        model: opts.model.unwrap_or_else(|| default_model.clone()),
        output_dir: opts
            .out
            .unwrap_or_else(|| PathBuf::from(&config.batch.output_dir)),
        poll_interval: secs_or(opts.interval, config.batch.poll_interval()),
        poll_timeout: secs_or(opts.timeout, config.batch.poll_timeout()),
        display_name: opts.display_name,
    };

    info!(
        source = %workflow.source.display(),
        model = %workflow.model,
        embeddings,
        "starting batch workflow"
    );

    let api = connect(&config)?;
    let reporter = CliProgress::new();
    let outcome = match task_type {
        Some(task_type) => {
            gembatch_core::run_embeddings_workflow(api.as_ref(), &workflow, task_type, &reporter)
                .await
        }
        None => gembatch_core::run_content_workflow(api.as_ref(), &workflow, &reporter).await,
    };
    reporter.finish();
    let outcome = outcome?;

    println!();
    if let Some(ingestion) = &outcome.ingestion {
        println!("  Requests: {} ({})", ingestion.total_requests, ingestion.output_file.display());
    }
    println!("  Uploaded: {}", outcome.uploaded_file.name);
    println!("  Job:      {}", outcome.job.name);
    println!("  State:    {}", outcome.job.state);
    println!("  Polls:    {}", outcome.polls);
    println!("  Time:     {:.1}s", outcome.elapsed.as_secs_f64());
    match &outcome.results {
        Some(results) => print_results(results),
        None => println!(),
    }

    if !outcome.succeeded() {
        let reason = outcome
            .job
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "no error message reported".to_string());
        return Err(eyre!("job finished as {}: {reason}", outcome.job.state));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tool commands
// ---------------------------------------------------------------------------

fn cmd_tools_list() -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&BatchTools::definitions())?
    );
    Ok(())
}

async fn cmd_tools_call(name: &str, args: &str) -> Result<()> {
    let args: Value = serde_json::from_str(args).wrap_err("--args must be a JSON object")?;
    let config = load_config()?;
    let tools = BatchTools::new(connect(&config)?, ToolDefaults::from_config(&config));

    match tools.call(name, args).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&gembatch_core::error_payload(&e))?
            );
            Err(e.into())
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_ingestion(report: &IngestionReport) {
    println!();
    println!("  Source:   {} ({})", report.source_file.display(), report.source_format);
    println!("  Output:   {}", report.output_file.display());
    println!("  Requests: {}", report.total_requests);
    println!(
        "  Valid:    {}",
        if report.validation_passed { "yes" } else { "no" }
    );
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    for error in &report.errors {
        println!("  error: {error}");
    }
    println!();
}

fn print_validation(report: &ValidationReport) {
    println!();
    println!("  Valid:     {}", if report.valid { "yes" } else { "no" });
    println!(
        "  Requests:  {} ({} content, {} embedding)",
        report.request_count, report.content_records, report.embedding_records
    );
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    for error in &report.errors {
        println!("  error: {error}");
    }
    println!();
}

fn print_job(job: &BatchJob) {
    println!();
    println!("  Job:     {}", job.name);
    if let Some(name) = &job.display_name {
        println!("  Name:    {name}");
    }
    println!("  State:   {}", job.state);
    if let Some(stats) = &job.stats {
        println!(
            "  Stats:   {} ok / {} failed / {} total",
            stats.success_count, stats.fail_count, stats.total_count
        );
    }
    if let Some(error) = &job.error {
        println!("  Error:   {}", error.message);
    }
    println!();
}

fn print_results(results: &DownloadedResults) {
    println!();
    println!("  Results: {}", results.results.len());
    println!("  Errors:  {}", results.error_count());
    println!("  Saved:   {}", results.file_path.display());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn job_polled(&self, job: &BatchJob, polls: usize, elapsed: Duration) {
        self.spinner.set_message(format!(
            "{} is {} [poll {polls}, {}s]",
            job.short_id(),
            job.state,
            elapsed.as_secs()
        ));
    }

    fn done(&self, _outcome: &WorkflowOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
