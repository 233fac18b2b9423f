// DownloadExecutor - one materialization attempt into scratch storage

use std::sync::Arc;

use tracing::{info, warn};

use super::errors::{DownloadFailure, ProviderError};
use super::models::{AchievedTier, DownloadResult, PostProcess, QualityTier, Selection};
use super::scratch::{ScratchDir, ScratchFile};
use super::traits::{CatalogProvider, MaterializeRequest};

/// Everything one attempt needs besides the selection
#[derive(Debug, Clone)]
pub struct DownloadJob<'a> {
    pub source: &'a str,
    pub title: &'a str,
    pub tier: QualityTier,
    pub post_process: &'a PostProcess,
}

pub struct DownloadExecutor {
    provider: Arc<dyn CatalogProvider>,
    scratch: ScratchDir,
}

impl DownloadExecutor {
    pub fn new(provider: Arc<dyn CatalogProvider>, scratch: ScratchDir) -> Self {
        Self { provider, scratch }
    }

    /// Materialize `selection` and measure the produced file.
    ///
    /// Each attempt gets its own scratch slot, so a failed attempt's partial
    /// files are swept before the next attempt starts.
    pub async fn execute(
        &self,
        job: &DownloadJob<'_>,
        selection: &Selection,
    ) -> Result<DownloadResult, DownloadFailure> {
        let slot = self.scratch.allocate(job.title);
        let request = MaterializeRequest {
            source: job.source,
            selection,
            slot: &slot,
            post_process: job.post_process,
        };

        info!(
            provider = self.provider.name(),
            source = job.source,
            selector = %selection,
            tier = %job.tier,
            "Downloading"
        );

        let path = match self.provider.materialize(request).await {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    selector = %selection,
                    error = %e,
                    reason = e.blocking_reason().map(|r| r.description()),
                    "Materialization failed"
                );
                return Err(DownloadFailure::new(selection.as_str(), &e));
            }
        };

        let file = ScratchFile::new(path, slot);
        let size_bytes = file.size_on_disk().map_err(|e| {
            let err = ProviderError::ExecutionError {
                message: format!("produced file unreadable at {}: {}", file.path().display(), e),
                reason: None,
            };
            DownloadFailure::new(selection.as_str(), &err)
        })?;

        info!(path = %file.path().display(), size_bytes, "Download complete");

        Ok(DownloadResult {
            file,
            title: job.title.to_string(),
            size_bytes,
            requested_tier: job.tier,
            achieved_tier: AchievedTier::Requested(job.tier),
        })
    }
}
