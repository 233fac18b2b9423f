// Extractor configuration and mode

use std::fmt;

use serde::{Deserialize, Serialize};

/// How yt-dlp is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorMode {
    /// Python module yt_dlp (`python3 -m yt_dlp`)
    Python,
    /// CLI binary yt-dlp (faster, no Python dependency)
    #[default]
    Cli,
}

impl fmt::Display for ExtractorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Cli => write!(f, "cli"),
        }
    }
}

/// Configuration for the yt-dlp provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub mode: ExtractorMode,
    /// Explicit yt-dlp binary; searched in common locations otherwise
    pub binary: Option<String>,
    /// Python interpreter for python mode; `YTDLP_PYTHON` or python3 otherwise
    pub python: Option<String>,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<String>,
    /// YouTube player client (android, web, tv)
    pub player_client: Option<String>,
    pub fetch_timeout_secs: u64,
    pub materialize_timeout_secs: u64,
    /// Target codec of the audio-extraction post-processor
    pub audio_codec: String,
    /// Target bitrate of the audio-extraction post-processor, in kbps
    pub audio_quality: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::Cli,
            binary: None,
            python: None,
            proxy: None,
            cookies_path: None,
            player_client: None,
            fetch_timeout_secs: 30,
            materialize_timeout_secs: 900,
            audio_codec: "mp3".to_string(),
            audio_quality: "192".to_string(),
        }
    }
}

impl ExtractorConfig {
    pub fn with_mode(mut self, mode: ExtractorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_binary(mut self, binary: Option<String>) -> Self {
        self.binary = binary;
        self
    }
}
