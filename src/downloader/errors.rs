// Error types for the provider, executor and pipeline layers

use std::path::PathBuf;

use thiserror::Error;

use super::extractors::{diagnose_error, BlockingReason};

/// Failure reported by a catalog provider (yt-dlp or a test double)
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// yt-dlp or python not found in system
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Provider did not answer within the configured timeout
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Failed to parse yt-dlp JSON output
    #[error("parse error: {0}")]
    ParseError(String),

    /// Command ran but reported failure; carries the relevant stderr
    #[error("execution error: {message}")]
    ExecutionError {
        message: String,
        reason: Option<BlockingReason>,
    },
}

impl ProviderError {
    /// Classify raw provider stderr into an execution error with a diagnosis
    pub fn from_stderr(stderr: &str) -> Self {
        let reason = diagnose_error(stderr);
        Self::ExecutionError {
            message: summarize_stderr(stderr),
            reason,
        }
    }

    pub fn blocking_reason(&self) -> Option<BlockingReason> {
        match self {
            Self::ExecutionError { reason, .. } => *reason,
            Self::Timeout(_) => Some(BlockingReason::NetworkTimeout),
            _ => None,
        }
    }
}

/// Keep the lines a human needs; yt-dlp stderr is mostly noise
fn summarize_stderr(stderr: &str) -> String {
    let important: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:") || l.contains("HTTP Error"))
        .take(2)
        .collect();

    if !important.is_empty() {
        return important.join(" | ");
    }

    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown error")
        .chars()
        .take(200)
        .collect()
}

/// The single failure variant surfaced by the download executor
#[derive(Debug, Clone, Error)]
#[error("download failed with selector '{selector}': {message}")]
pub struct DownloadFailure {
    pub selector: String,
    pub message: String,
    pub reason: Option<BlockingReason>,
}

impl DownloadFailure {
    pub fn new(selector: impl Into<String>, err: &ProviderError) -> Self {
        Self {
            selector: selector.into(),
            message: err.to_string(),
            reason: err.blocking_reason(),
        }
    }
}

/// Fatal outcomes of one pipeline run, one per user-visible message category
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not fetch media catalog: {0}")]
    CatalogFetch(#[source] ProviderError),

    #[error("no suitable encoding for the requested quality")]
    ResolutionEmpty,

    #[error("download failed and the fallback was exhausted: {fallback}")]
    FallbackExhausted {
        primary: DownloadFailure,
        fallback: DownloadFailure,
    },

    #[error("file size {size_bytes} bytes exceeds the budget of {budget_bytes} bytes")]
    BudgetExceeded { size_bytes: u64, budget_bytes: u64 },

    #[error("audio file missing after conversion: {}", base.display())]
    FinalizationMissing { base: PathBuf },

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("scratch storage error at {}: {source}", path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure reported by the consumer that receives the finished file
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery timed out after {0}s")]
    Timeout(u64),

    #[error("delivery io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("delivery rejected: {0}")]
    Rejected(String),
}
