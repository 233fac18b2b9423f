// Common data models for the download pipeline

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::scratch::ScratchFile;

/// Quality level requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    #[serde(rename = "144")]
    P144,
    #[serde(rename = "240")]
    P240,
    #[serde(rename = "360")]
    P360,
    #[serde(rename = "480")]
    P480,
    #[serde(rename = "720")]
    P720,
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "audio")]
    Audio,
}

impl QualityTier {
    pub const ALL: [QualityTier; 7] = [
        Self::P144,
        Self::P240,
        Self::P360,
        Self::P480,
        Self::P720,
        Self::Best,
        Self::Audio,
    ];

    /// Target height in pixels for numeric tiers
    pub fn height(&self) -> Option<u32> {
        match self {
            Self::P144 => Some(144),
            Self::P240 => Some(240),
            Self::P360 => Some(360),
            Self::P480 => Some(480),
            Self::P720 => Some(720),
            Self::Best | Self::Audio => None,
        }
    }

    pub fn from_height(height: u32) -> Option<Self> {
        match height {
            144 => Some(Self::P144),
            240 => Some(Self::P240),
            360 => Some(Self::P360),
            480 => Some(Self::P480),
            720 => Some(Self::P720),
            _ => None,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => write!(f, "best"),
            Self::Audio => write!(f, "audio"),
            numeric => write!(f, "{}p", numeric.height().unwrap_or_default()),
        }
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "best" => Ok(Self::Best),
            "audio" | "mp3" => Ok(Self::Audio),
            other => other
                .trim_end_matches('p')
                .parse::<u32>()
                .ok()
                .and_then(Self::from_height)
                .ok_or_else(|| format!("unknown quality tier: {}", s)),
        }
    }
}

/// Hard ceiling on the delivered file size, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBudget(u64);

impl SizeBudget {
    /// Returns `None` for a zero budget
    pub fn new(bytes: u64) -> Option<Self> {
        (bytes > 0).then_some(Self(bytes))
    }

    pub fn from_megabytes(mb: u64) -> Option<Self> {
        Self::new(mb.saturating_mul(1024 * 1024))
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    pub fn allows(&self, size_bytes: u64) -> bool {
        size_bytes <= self.0
    }
}

impl fmt::Display for SizeBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_limit(self.0))
    }
}

/// Format a byte count the way users see it ("12.3MB")
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / 1_048_576.0)
}

/// Format a size limit: whole megabytes stay bare ("50MB"), limits under
/// a megabyte are shown in kilobytes
pub fn format_limit(bytes: u64) -> String {
    const MEGABYTE: u64 = 1_048_576;
    if bytes < MEGABYTE {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes % MEGABYTE == 0 {
        format!("{}MB", bytes / MEGABYTE)
    } else {
        format_megabytes(bytes)
    }
}

/// One rendition of the source media as reported by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingDescriptor {
    /// Provider format id (e.g. "18", "140")
    pub id: String,
    /// Container extension (mp4, webm, m4a)
    pub ext: Option<String>,
    pub has_video: bool,
    pub has_audio: bool,
    pub height_px: Option<u32>,
    pub bitrate_kbps: Option<f64>,
    /// Advisory size estimate; the file on disk is authoritative
    pub size_bytes: Option<u64>,
}

impl EncodingDescriptor {
    /// Muxed rendition usable for video tiers
    pub fn is_video_candidate(&self) -> bool {
        self.has_video && self.has_audio
    }

    pub fn is_audio_candidate(&self) -> bool {
        self.has_audio && !self.has_video
    }

    /// Unknown sizes do not violate the budget
    pub fn fits(&self, budget: SizeBudget) -> bool {
        self.size_bytes.map_or(true, |s| budget.allows(s))
    }

    /// Only a known size can be proven to fit
    pub fn known_fit(&self, budget: SizeBudget) -> bool {
        self.size_bytes.is_some_and(|s| budget.allows(s))
    }
}

/// Catalog returned by a provider for one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCatalog {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration_seconds: u64,
    pub upload_date: Option<time::Date>,
    pub encodings: Vec<EncodingDescriptor>,
}

impl MediaCatalog {
    /// Duration as m:ss for display
    pub fn duration_label(&self) -> String {
        format!("{}:{:02}", self.duration_seconds / 60, self.duration_seconds % 60)
    }
}

/// How the provider should choose what to materialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The exact encoding id picked by the resolver
    Exact(String),
    /// A provider-native expression (e.g. "best[filesize<=N]/best")
    ProviderDefault(String),
}

impl Selection {
    /// Provider-native "best available under budget" expression
    pub fn best_under_budget(tier: QualityTier, budget: SizeBudget) -> Self {
        let base = if tier.is_audio() { "bestaudio" } else { "best" };
        Self::ProviderDefault(format!("{base}[filesize<={}]/{base}", budget.bytes()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(s) | Self::ProviderDefault(s) => s,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::ProviderDefault(_))
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-processing the provider is asked to apply after download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcess {
    None,
    ExtractAudio { codec: String, quality: String },
}

impl PostProcess {
    pub fn for_tier(tier: QualityTier, codec: &str, quality: &str) -> Self {
        if tier.is_audio() {
            Self::ExtractAudio {
                codec: codec.to_string(),
                quality: quality.to_string(),
            }
        } else {
            Self::None
        }
    }
}

/// Tier actually delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AchievedTier {
    Requested(QualityTier),
    /// Primary attempt failed; the provider's own best-under-budget pick was used
    BestAvailableFallback,
}

impl fmt::Display for AchievedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested(tier) => write!(f, "{}", tier),
            Self::BestAvailableFallback => write!(f, "best available"),
        }
    }
}

/// A materialized file owned by the requesting flow
#[derive(Debug)]
pub struct DownloadResult {
    pub file: ScratchFile,
    pub title: String,
    pub size_bytes: u64,
    pub requested_tier: QualityTier,
    pub achieved_tier: AchievedTier,
}
