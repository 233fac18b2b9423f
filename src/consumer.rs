// DirectoryConsumer - delivers an accepted result by copying it out of scratch

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use crate::config::UploadTimeouts;
use crate::downloader::scratch::sanitize_title;
use crate::downloader::{Consumer, DeliveryError, DownloadResult};

pub struct DirectoryConsumer {
    output_dir: PathBuf,
    timeouts: UploadTimeouts,
}

impl DirectoryConsumer {
    pub fn new(output_dir: impl Into<PathBuf>, timeouts: UploadTimeouts) -> Self {
        Self {
            output_dir: output_dir.into(),
            timeouts,
        }
    }

    /// The user's download directory, or the current directory
    pub fn default_output_dir() -> PathBuf {
        dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<title>.<ext>`, numbered when the name is taken
    async fn target_path(&self, result: &DownloadResult) -> PathBuf {
        let stem = sanitize_title(&result.title);
        let ext = result
            .file
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");

        let mut candidate = self.output_dir.join(format!("{stem}.{ext}"));
        let mut n = 1;
        while fs::try_exists(&candidate).await.unwrap_or(false) {
            candidate = self.output_dir.join(format!("{stem} ({n}).{ext}"));
            n += 1;
        }
        candidate
    }

    /// Reach the destination and pick a free name
    async fn prepare(&self, result: &DownloadResult) -> Result<PathBuf, DeliveryError> {
        fs::create_dir_all(&self.output_dir).await?;
        Ok(self.target_path(result).await)
    }

    /// Read back what landed; it must match the size the guard accepted
    async fn confirm(&self, target: &Path, expected: u64) -> Result<(), DeliveryError> {
        let written = fs::metadata(target).await?.len();
        if written != expected {
            let _ = fs::remove_file(target).await;
            return Err(DeliveryError::Rejected(format!(
                "{} holds {} bytes, expected {}",
                target.display(),
                written,
                expected
            )));
        }
        Ok(())
    }
}

async fn bounded<T>(
    secs: u64,
    stage: impl Future<Output = Result<T, DeliveryError>>,
) -> Result<T, DeliveryError> {
    tokio::time::timeout(Duration::from_secs(secs), stage)
        .await
        .map_err(|_| DeliveryError::Timeout(secs))?
}

#[async_trait]
impl Consumer for DirectoryConsumer {
    async fn deliver(&self, result: &DownloadResult) -> Result<(), DeliveryError> {
        let target = bounded(self.timeouts.connect_secs, self.prepare(result)).await?;
        bounded(self.timeouts.write_secs, async {
            fs::copy(result.file.path(), &target).await?;
            Ok::<(), DeliveryError>(())
        })
        .await?;
        bounded(
            self.timeouts.read_secs,
            self.confirm(&target, result.size_bytes),
        )
        .await?;

        info!(
            path = %target.display(),
            size_bytes = result.size_bytes,
            tier = %result.achieved_tier,
            "Delivered"
        );
        Ok(())
    }
}
