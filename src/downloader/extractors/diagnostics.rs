// Failure diagnostics - classifies provider stderr
//
// Materialization failures are surfaced as a single failure variant, but the
// message still needs to say *why* the provider refused so the caller can
// report something actionable.

use serde::{Deserialize, Serialize};

/// Reasons why the provider might refuse a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    /// Encoding listed in the catalog but gone at materialization time
    FormatUnavailable,

    /// HTTP 403 Forbidden - general access denied
    Http403Forbidden,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Geographic restriction
    GeoBlocked,

    /// Network timeout (soft IP block)
    NetworkTimeout,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot detection triggered
    BotDetection,

    /// Private video requiring authorization
    PrivateVideo,

    /// Video deleted or unavailable
    VideoUnavailable,

    /// Generic/unknown failure
    Unknown,
}

impl BlockingReason {
    /// Whether a relaxed selector has a chance where the exact one failed
    pub fn fallback_might_help(&self) -> bool {
        matches!(
            self,
            Self::FormatUnavailable | Self::Http403Forbidden | Self::Unknown
        )
    }

    /// Check if this is a permanent restriction (no workaround)
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::VideoUnavailable | Self::PrivateVideo)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::FormatUnavailable => "Requested format not available",
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::AgeRestricted => "Age-restricted content",
            Self::GeoBlocked => "Geographic restriction",
            Self::NetworkTimeout => "Network timeout",
            Self::RateLimited => "Rate limited",
            Self::BotDetection => "Bot detection triggered",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Analyze error message and return the most specific reason
pub fn diagnose_error(error: &str) -> Option<BlockingReason> {
    if error.trim().is_empty() {
        return None;
    }

    let lower = error.to_lowercase();

    if lower.contains("requested format is not available") || lower.contains("no video formats") {
        return Some(BlockingReason::FormatUnavailable);
    }

    if lower.contains("age-restricted") || lower.contains("sign in to confirm your age") {
        return Some(BlockingReason::AgeRestricted);
    }

    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("sign in if you've been granted access")
    {
        return Some(BlockingReason::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("this video is no longer available")
    {
        return Some(BlockingReason::VideoUnavailable);
    }

    if lower.contains("not available in your country") || lower.contains("blocked in your country")
    {
        return Some(BlockingReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(BlockingReason::RateLimited);
    }

    if lower.contains("confirm you're not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return Some(BlockingReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(BlockingReason::Http403Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network unreachable")
    {
        return Some(BlockingReason::NetworkTimeout);
    }

    Some(BlockingReason::Unknown)
}
