//! Gemini REST implementation of the [`BatchApi`](gembatch_shared::BatchApi)
//! collaborator: file upload/download and batch job create/get/cancel/delete.
//!
//! The core pipeline never depends on this crate directly; the CLI wires a
//! [`GeminiClient`] in behind `Arc<dyn BatchApi>`.

mod client;
mod wire;

pub use client::{GeminiClient, GeminiClientConfig};
