// AudioFinalizer - make sure an audio result ends in the canonical extension
//
// Extraction is the provider's job. When its extension rewrite did not happen,
// the slot is searched for known containers and the first hit is renamed.

use std::path::Path;

use tracing::{debug, info};

use super::errors::PipelineError;
use super::models::DownloadResult;

/// Containers yt-dlp may leave behind when audio extraction is skipped
pub const ALTERNATE_EXTENSIONS: [&str; 4] = ["webm", "m4a", "opus", "mp3"];

pub struct AudioFinalizer {
    canonical_ext: String,
}

impl AudioFinalizer {
    pub fn new(canonical_ext: impl Into<String>) -> Self {
        Self {
            canonical_ext: canonical_ext.into(),
        }
    }

    pub fn canonical_ext(&self) -> &str {
        &self.canonical_ext
    }

    pub fn finalize(&self, mut result: DownloadResult) -> Result<DownloadResult, PipelineError> {
        if has_extension(result.file.path(), &self.canonical_ext) && result.file.path().is_file() {
            return Ok(result);
        }

        let target = result.file.slot().path_with_ext(&self.canonical_ext);
        if target.is_file() {
            debug!(path = %target.display(), "Provider reported a stale path, adopting converted file");
            result.file.adopt(target);
        } else {
            let found = ALTERNATE_EXTENSIONS
                .iter()
                .filter(|ext| **ext != self.canonical_ext)
                .map(|ext| result.file.slot().path_with_ext(ext))
                .find(|candidate| candidate.is_file());

            let Some(candidate) = found else {
                let slot = result.file.slot();
                return Err(PipelineError::FinalizationMissing {
                    base: slot.dir().join(slot.stem()),
                });
            };

            info!(
                from = %candidate.display(),
                to = %target.display(),
                "Renaming audio file to canonical extension"
            );
            result.file.adopt(candidate);
            result
                .file
                .rename_to(target.clone())
                .map_err(|source| PipelineError::Scratch {
                    path: target,
                    source,
                })?;
        }

        result.size_bytes = result
            .file
            .size_on_disk()
            .map_err(|source| PipelineError::Scratch {
                path: result.file.path().to_path_buf(),
                source,
            })?;
        Ok(result)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
