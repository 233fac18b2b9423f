//! CLI entry point for media-fetch.

use std::process::ExitCode;

use clap::Parser;
use media_fetch_lib::cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    media_fetch_lib::init_tracing(&args);

    media_fetch_lib::run(args).await
}
