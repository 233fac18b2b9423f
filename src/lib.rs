// media-fetch: size-budgeted media downloads on top of yt-dlp
//
// The library holds the pipeline (`downloader`), its configuration and the
// directory consumer; the binary only parses flags and calls `run`.

pub mod cli;
pub mod config;
pub mod consumer;
pub mod downloader;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use cli::Args;
use config::PipelineConfig;
use consumer::DirectoryConsumer;
use downloader::models::format_megabytes;
use downloader::scratch::ScratchDir;
use downloader::{
    outcome_message, AuthorizationGate, PipelineContext, QualityResolver, ResolutionOutcome,
    StaticAllowList, YtDlpProvider,
};

/// Exit code when the requester is not on the allow-list
const EXIT_DENIED: u8 = 3;
/// Exit code when the request was interrupted
const EXIT_INTERRUPTED: u8 = 130;

/// Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
pub fn init_tracing(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_context(config: &PipelineConfig) -> Result<PipelineContext> {
    let provider = Arc::new(YtDlpProvider::new(config.provider.clone()));
    let resolver = QualityResolver::new(config.priority_table()?);

    Ok(PipelineContext::new(
        provider,
        resolver,
        config.budget()?,
        ScratchDir::new(config.scratch_root()),
    )
    .with_audio_target(&config.provider.audio_codec, &config.provider.audio_quality))
}

pub async fn run(args: Args) -> Result<ExitCode> {
    let mut config = PipelineConfig::load_or_default(args.config.as_deref())
        .context("failed to load configuration")?;
    args.apply_to(&mut config);
    config.validate().context("invalid configuration")?;
    debug!(?config, "Configuration resolved");

    let gate = StaticAllowList::new(config.allowed_requesters.iter().cloned());
    if !gate.check(&args.requester) {
        warn!(requester = %args.requester, "Requester not allowed");
        println!("Access denied");
        return Ok(ExitCode::from(EXIT_DENIED));
    }

    let context = build_context(&config)?;
    info!(
        provider = context.provider_name(),
        budget = %context.budget(),
        quality = %args.quality,
        "media-fetch starting"
    );

    if args.info {
        return print_info(&context, &args.source).await;
    }

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(DirectoryConsumer::default_output_dir);
    let consumer = DirectoryConsumer::new(output_dir, config.upload);

    // Dropping the request future kills the child and sweeps its scratch files
    let outcome = tokio::select! {
        outcome = context.run(&args.source, args.quality, &consumer) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning request");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    println!("{}", outcome_message(&outcome));
    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn print_info(context: &PipelineContext, source: &str) -> Result<ExitCode> {
    let (catalog, choices) = match context.inspect(source).await {
        Ok(found) => found,
        Err(e) => {
            println!("{}", outcome_message(&Err(e)));
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("{}", catalog.title);
    println!("  uploader: {}", catalog.uploader);
    println!("  duration: {}", catalog.duration_label());
    if let Some(date) = catalog.upload_date {
        println!("  uploaded: {}", date);
    }
    println!("  formats:  {}", catalog.encodings.len());
    println!("  limit:    {}", context.budget());
    println!();

    for (tier, outcome) in choices {
        match outcome {
            ResolutionOutcome::Chosen { id, path } => {
                let size = catalog
                    .encodings
                    .iter()
                    .find(|e| e.id == id)
                    .and_then(|e| e.size_bytes)
                    .map(format_megabytes)
                    .unwrap_or_else(|| "size unknown".to_string());
                println!("  {:>6}  {:<8} {:<10} {}", tier.to_string(), id, size, path.describe());
            }
            ResolutionOutcome::NoSuitableEncoding => {
                println!("  {:>6}  no suitable format", tier.to_string());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
