//! Shared types, error model, and configuration for gembatch.
//!
//! This crate is the foundation depended on by all other gembatch crates.
//! It provides:
//! - [`GembatchError`] — the unified error type
//! - Domain types ([`BatchJob`], [`JobState`], [`TaskType`], [`ResultRecord`])
//! - The [`BatchApi`] collaborator trait
//! - Configuration ([`AppConfig`], config loading)

pub mod api;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use api::{BatchApi, JSONL_MIME_TYPE, JobConfig, SubmissionPayload};
pub use config::{
    AppConfig, BatchConfig, DEFAULT_BASE_URL, GeminiConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{GembatchError, Result};
pub use types::{
    BatchDestination, BatchJob, BatchStats, InlinedResponse, JobError, JobKind, JobState,
    ResultRecord, TaskType, UploadedFile, response_text,
};
