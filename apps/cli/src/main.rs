//! gembatch CLI — Gemini batch jobs from local files.
//!
//! Converts CSV, JSON and text sources into JSONL request files, submits
//! them as content-generation or embedding batches, tracks the jobs and
//! saves their results.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
