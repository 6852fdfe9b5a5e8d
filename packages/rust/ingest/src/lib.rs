//! Source ingestion for batch jobs: format detection, JSONL conversion,
//! JSONL validation and embedding task-type advice.
//!
//! - [`detect`] — classify a source file ([`SourceDescriptor`])
//! - [`convert`] — write a JSONL request artifact ([`IngestionReport`])
//! - [`validate`] — check an artifact line by line ([`ValidationReport`])
//! - [`advisor`] — suggest an embedding [`TaskType`](gembatch_shared::TaskType)

pub mod advisor;
pub mod convert;
pub mod detect;
pub mod records;
pub mod validate;

pub use advisor::{TaskTypeRecommendation, recommend_task_type};
pub use convert::{ConvertOptions, IngestionReport, convert_to_jsonl, ingest_content, ingest_embeddings};
pub use detect::{Complexity, SourceDescriptor, SourceFormat, StructureHint, detect_format};
pub use records::{Content, Part, RequestBody, RequestRecord, TargetSchema};
pub use validate::{NO_REQUESTS, ValidationReport, validate_for_kind, validate_jsonl, validate_str};
