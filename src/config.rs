// Process-wide configuration, read once at startup
//
// JSON file, every field optional. Looked up at
// `<config dir>/media-fetch/config.json` unless a path is given.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::downloader::{ExtractorConfig, PriorityStep, PriorityTable, QualityTier, SizeBudget};

const APP_DIR: &str = "media-fetch";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Timeouts handed untouched to the consumer, one per delivery stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadTimeouts {
    /// Reaching the destination
    pub connect_secs: u64,
    /// Reading back the delivery acknowledgement
    pub read_secs: u64,
    /// Sending the file body
    pub write_secs: u64,
}

impl Default for UploadTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: 60,
            read_secs: 300,
            write_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Size ceiling of a delivered file, in megabytes
    pub max_file_size_mb: u64,
    /// Defaults to `<temp>/media-fetch`
    pub scratch_dir: Option<PathBuf>,
    pub priority_overrides: HashMap<QualityTier, Vec<PriorityStep>>,
    pub upload: UploadTimeouts,
    pub provider: ExtractorConfig,
    /// Requesters allowed past the gate; empty admits everyone
    pub allowed_requesters: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            scratch_dir: None,
            priority_overrides: HashMap::new(),
            upload: UploadTimeouts::default(),
            provider: ExtractorConfig::default(),
            allowed_requesters: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load an explicit file, or the default location if it exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=4096).contains(&self.max_file_size_mb) {
            return Err(ConfigError::Invalid {
                field: "max_file_size_mb",
                message: format!("{} (expected 1..=4096)", self.max_file_size_mb),
            });
        }

        validate_timeout_secs("upload.connect_secs", self.upload.connect_secs)?;
        validate_timeout_secs("upload.read_secs", self.upload.read_secs)?;
        validate_timeout_secs("upload.write_secs", self.upload.write_secs)?;
        validate_timeout_secs("provider.fetch_timeout_secs", self.provider.fetch_timeout_secs)?;
        validate_timeout_secs(
            "provider.materialize_timeout_secs",
            self.provider.materialize_timeout_secs,
        )?;

        if self.provider.audio_codec.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "provider.audio_codec",
                message: "must not be empty".to_string(),
            });
        }

        self.priority_table()?;
        Ok(())
    }

    pub fn budget(&self) -> Result<SizeBudget, ConfigError> {
        SizeBudget::from_megabytes(self.max_file_size_mb).ok_or_else(|| ConfigError::Invalid {
            field: "max_file_size_mb",
            message: "must be positive".to_string(),
        })
    }

    pub fn priority_table(&self) -> Result<PriorityTable, ConfigError> {
        PriorityTable::default()
            .with_overrides(&self.priority_overrides)
            .map_err(|message| ConfigError::Invalid {
                field: "priority_overrides",
                message,
            })
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::Invalid {
            field,
            message: format!("{} (expected 1..=3600)", value),
        });
    }
    Ok(())
}
