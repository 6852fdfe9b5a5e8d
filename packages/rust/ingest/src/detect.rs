//! Source format detection.
//!
//! Classification is by file extension only; the content is read solely to
//! describe its structure and estimate how lossy conversion will be. Formats
//! the converter cannot handle are never decoded, so binary files classify
//! as opaque instead of failing.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use gembatch_shared::{GembatchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jsonl,
    Json,
    Csv,
    Text,
    Xml,
    Unknown,
}

impl SourceFormat {
    /// Classify a path by its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("jsonl" | "ndjson") => Self::Jsonl,
            Some("json") => Self::Json,
            Some("csv") => Self::Csv,
            Some("txt" | "md") => Self::Text,
            Some("xml") => Self::Xml,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Text => "text",
            Self::Xml => "xml",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the converter knows how to turn this format into records.
    pub fn is_convertible(&self) -> bool {
        !matches!(self, Self::Xml | Self::Unknown)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the source content as seen by the detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureHint {
    /// One record per non-blank line (jsonl, text).
    LineRecords { lines: usize },
    JsonArray { len: usize },
    JsonObject { fields: usize },
    JsonScalar,
    /// `.json` file that did not parse; the converter will still try.
    UnparsedJson,
    /// CSV with a header line; `rows` excludes the header.
    Csv { columns: usize, rows: usize },
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Result of inspecting a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub structure: StructureHint,
    pub complexity: Complexity,
}

/// Inspect a source file and classify it.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn detect_format(path: &Path) -> Result<SourceDescriptor> {
    let format = SourceFormat::from_path(path);
    let descriptor = if format.is_convertible() {
        let content = read_source(path)?;
        describe(path, &content)
    } else {
        std::fs::metadata(path).map_err(|e| GembatchError::io(path, e))?;
        opaque(path, format)
    };
    debug!(
        format = %descriptor.format,
        complexity = ?descriptor.complexity,
        "source classified"
    );
    Ok(descriptor)
}

pub(crate) fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| GembatchError::io(path, e))
}

/// Describe already-read content. Pure.
pub(crate) fn describe(path: &Path, content: &str) -> SourceDescriptor {
    let format = SourceFormat::from_path(path);
    let (structure, complexity) = match format {
        SourceFormat::Jsonl | SourceFormat::Text => (
            StructureHint::LineRecords {
                lines: non_blank_lines(content).count(),
            },
            Complexity::Simple,
        ),
        SourceFormat::Json => describe_json(content),
        SourceFormat::Csv => describe_csv(content),
        SourceFormat::Xml | SourceFormat::Unknown => return opaque(path, format),
    };

    SourceDescriptor {
        path: path.to_path_buf(),
        format,
        structure,
        complexity,
    }
}

fn opaque(path: &Path, format: SourceFormat) -> SourceDescriptor {
    SourceDescriptor {
        path: path.to_path_buf(),
        format,
        structure: StructureHint::Opaque,
        complexity: Complexity::Complex,
    }
}

fn describe_json(content: &str) -> (StructureHint, Complexity) {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => {
            let nested = items.iter().any(|v| v.is_object() || v.is_array());
            let complexity = if nested {
                Complexity::Moderate
            } else {
                Complexity::Simple
            };
            (StructureHint::JsonArray { len: items.len() }, complexity)
        }
        Ok(Value::Object(map)) => (
            StructureHint::JsonObject { fields: map.len() },
            Complexity::Moderate,
        ),
        Ok(_) => (StructureHint::JsonScalar, Complexity::Simple),
        Err(_) => (StructureHint::UnparsedJson, Complexity::Complex),
    }
}

fn describe_csv(content: &str) -> (StructureHint, Complexity) {
    let mut lines = content.lines();
    let columns = lines
        .next()
        .map(|header| header.split(',').count())
        .unwrap_or(0);
    let rows = lines.filter(|l| !l.trim().is_empty()).count();
    // Whole rows become prompts, so extra columns are carried along verbatim.
    let complexity = if columns <= 1 {
        Complexity::Simple
    } else {
        Complexity::Moderate
    };
    (StructureHint::Csv { columns, rows }, complexity)
}

/// Non-blank lines with any trailing carriage return removed.
pub(crate) fn non_blank_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
}
