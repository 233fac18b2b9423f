//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use crate::config::PipelineConfig;
use crate::downloader::{ExtractorMode, QualityTier};

/// Fetch one media source at a requested quality without exceeding a size limit.
///
/// Picks the closest rendition that fits, retries once with the provider's own
/// best-under-limit choice, and never delivers a file over the limit.
#[derive(Parser, Debug)]
#[command(name = "media-fetch")]
#[command(author, version, about)]
pub struct Args {
    /// Media page URL
    pub source: String,

    /// Requested quality: 144, 240, 360, 480, 720, best or audio
    #[arg(long, default_value = "360", value_parser = parse_tier)]
    pub quality: QualityTier,

    /// Config file (JSON); defaults to the user config directory
    #[arg(short, long, env = "MEDIA_FETCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Size limit in megabytes (1-4096)
    #[arg(long, env = "MEDIA_FETCH_MAX_SIZE_MB", value_parser = clap::value_parser!(u64).range(1..=4096))]
    pub max_size_mb: Option<u64>,

    /// Directory for in-flight downloads
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Where delivered files are copied
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// yt-dlp invocation: cli or python
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<ExtractorMode>,

    /// Requester id checked against the allow-list
    #[arg(long, env = "MEDIA_FETCH_REQUESTER", default_value = "local")]
    pub requester: String,

    /// Show the catalog and what each quality would pick, without downloading
    #[arg(long)]
    pub info: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Flags win over file values
    pub fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(mb) = self.max_size_mb {
            config.max_file_size_mb = mb;
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = Some(dir.clone());
        }
        if let Some(mode) = self.mode {
            config.provider.mode = mode;
        }
    }

    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

fn parse_tier(value: &str) -> Result<QualityTier, String> {
    value.parse()
}

fn parse_mode(value: &str) -> Result<ExtractorMode, String> {
    match value.trim().to_lowercase().as_str() {
        "cli" => Ok(ExtractorMode::Cli),
        "python" => Ok(ExtractorMode::Python),
        other => Err(format!("unknown mode '{}' (expected cli or python)", other)),
    }
}
