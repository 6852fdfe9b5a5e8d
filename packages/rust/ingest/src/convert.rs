//! Source file → JSONL request artifact conversion.
//!
//! Every record is rendered in memory before the single output write, so a
//! failed conversion never leaves a partial artifact behind. The written file
//! is then validated against the target schema and the outcome is returned
//! as an [`IngestionReport`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use gembatch_shared::{GembatchError, Result, TaskType};

use crate::detect::{self, SourceFormat, non_blank_lines};
use crate::records::TargetSchema;
use crate::validate;

/// Inputs for one conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub source: PathBuf,
    /// Overwritten if it exists.
    pub output: PathBuf,
    pub target: TargetSchema,
}

/// Summary of one ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub source_file: PathBuf,
    pub output_file: PathBuf,
    pub source_format: SourceFormat,
    pub total_requests: usize,
    pub validation_passed: bool,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl IngestionReport {
    fn failed(opts: &ConvertOptions, format: SourceFormat, error: String) -> Self {
        Self {
            source_file: opts.source.clone(),
            output_file: opts.output.clone(),
            source_format: format,
            total_requests: 0,
            validation_passed: false,
            errors: vec![error],
            warnings: Vec::new(),
        }
    }
}

/// Ingest a source file into content-generation requests.
pub fn ingest_content(source: &Path, output: &Path) -> Result<IngestionReport> {
    convert_to_jsonl(&ConvertOptions {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        target: TargetSchema::Content,
    })
}

/// Ingest a source file into embedding requests.
///
/// The task type is mandatory; a missing one is rejected before any I/O.
pub fn ingest_embeddings(
    source: &Path,
    output: &Path,
    task_type: Option<TaskType>,
) -> Result<IngestionReport> {
    let task_type = task_type.ok_or_else(|| {
        GembatchError::invalid_params(
            "embedding ingestion requires a task_type (see batch_query_task_type)",
        )
    })?;
    convert_to_jsonl(&ConvertOptions {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        target: TargetSchema::Embedding(task_type),
    })
}

/// Convert a source file into a JSONL artifact and validate the result.
///
/// Conversion problems (unsupported format, unparseable JSON) come back as a
/// failed report; only I/O errors are returned as `Err`.
#[instrument(skip_all, fields(source = %opts.source.display(), output = %opts.output.display()))]
pub fn convert_to_jsonl(opts: &ConvertOptions) -> Result<IngestionReport> {
    let format = SourceFormat::from_path(&opts.source);
    if !format.is_convertible() {
        let err = unsupported(&opts.source, format);
        warn!(%format, "source format not convertible");
        return Ok(IngestionReport::failed(opts, format, err.to_string()));
    }

    let content = detect::read_source(&opts.source)?;
    let lines = match render_lines(&opts.source, format, &content, opts.target) {
        Ok(lines) => lines,
        Err(e) => {
            warn!(error = %e, "conversion aborted");
            return Ok(IngestionReport::failed(opts, format, e.to_string()));
        }
    };

    write_jsonl(&opts.output, &lines)?;

    let validation = validate::validate_for_kind(&opts.output, opts.target.kind())?;

    info!(
        %format,
        requests = lines.len(),
        valid = validation.valid,
        "source converted to JSONL"
    );

    Ok(IngestionReport {
        source_file: opts.source.clone(),
        output_file: opts.output.clone(),
        source_format: format,
        total_requests: lines.len(),
        validation_passed: validation.valid,
        errors: validation.errors,
        warnings: validation.warnings,
    })
}

/// Render the JSONL lines for a source. Keys are 1-based and contiguous.
pub(crate) fn render_lines(
    source: &Path,
    format: SourceFormat,
    content: &str,
    target: TargetSchema,
) -> Result<Vec<String>> {
    let texts: Vec<String> = match format {
        SourceFormat::Jsonl => {
            // Already in request form; carried over untouched.
            return Ok(non_blank_lines(content).map(str::to_string).collect());
        }
        SourceFormat::Json => json_texts(content)?,
        // The header is dropped unconditionally; rows are used whole.
        SourceFormat::Csv => content
            .lines()
            .skip(1)
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect(),
        SourceFormat::Text => non_blank_lines(content).map(str::to_string).collect(),
        SourceFormat::Xml | SourceFormat::Unknown => return Err(unsupported(source, format)),
    };

    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            serde_json::to_string(&target.record(i + 1, text))
                .map_err(|e| GembatchError::parse(format!("failed to encode record {}: {e}", i + 1)))
        })
        .collect()
}

fn unsupported(source: &Path, format: SourceFormat) -> GembatchError {
    GembatchError::UnsupportedFormat {
        format: format.to_string(),
        path: source.to_path_buf(),
    }
}

/// Texts from a JSON source: one per array element, or one for the whole value.
fn json_texts(content: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| GembatchError::parse(format!("source is not valid JSON: {e}")))?;
    let texts = match value {
        Value::Array(items) => items.into_iter().map(value_text).collect(),
        other => vec![value_text(other)],
    };
    Ok(texts)
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn write_jsonl(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| GembatchError::io(parent, e))?;
    }
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    std::fs::write(path, body).map_err(|e| GembatchError::io(path, e))
}
