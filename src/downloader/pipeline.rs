// Pipeline - one request from catalog fetch to cleanup
//
// fetch -> resolve -> cascade (primary + one fallback) -> audio finalize -> guard
// -> deliver -> delete. The context is built once at startup and shared
// read-only by every request.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::cascade::FallbackCascade;
use super::errors::PipelineError;
use super::executor::{DownloadExecutor, DownloadJob};
use super::finalizer::AudioFinalizer;
use super::guard::{GuardVerdict, ResultGuard};
use super::models::{
    format_limit, format_megabytes, AchievedTier, DownloadResult, MediaCatalog, PostProcess,
    QualityTier, Selection, SizeBudget,
};
use super::resolver::{QualityResolver, ResolutionOutcome};
use super::scratch::ScratchDir;
use super::traits::{CatalogProvider, Consumer};

pub struct PipelineContext {
    provider: Arc<dyn CatalogProvider>,
    resolver: QualityResolver,
    budget: SizeBudget,
    scratch: ScratchDir,
    finalizer: AudioFinalizer,
    audio_quality: String,
}

/// What the requester is told after a successful delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub title: String,
    pub size_bytes: u64,
    pub requested_tier: QualityTier,
    pub achieved_tier: AchievedTier,
}

impl DeliveryReport {
    fn from_result(result: &DownloadResult) -> Self {
        Self {
            title: result.title.clone(),
            size_bytes: result.size_bytes,
            requested_tier: result.requested_tier,
            achieved_tier: result.achieved_tier,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.achieved_tier == AchievedTier::BestAvailableFallback
    }
}

impl PipelineContext {
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        resolver: QualityResolver,
        budget: SizeBudget,
        scratch: ScratchDir,
    ) -> Self {
        Self {
            provider,
            resolver,
            budget,
            scratch,
            finalizer: AudioFinalizer::new("mp3"),
            audio_quality: "192".to_string(),
        }
    }

    pub fn with_audio_target(mut self, codec: &str, quality: &str) -> Self {
        self.finalizer = AudioFinalizer::new(codec);
        self.audio_quality = quality.to_string();
        self
    }

    pub fn budget(&self) -> SizeBudget {
        self.budget
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    async fn fetch_catalog(&self, source: &str) -> Result<MediaCatalog, PipelineError> {
        self.provider.fetch(source).await.map_err(|e| {
            warn!(source, error = %e, "Catalog fetch failed");
            PipelineError::CatalogFetch(e)
        })
    }

    /// Fetch the catalog and resolve every tier without downloading
    pub async fn inspect(
        &self,
        source: &str,
    ) -> Result<(MediaCatalog, Vec<(QualityTier, ResolutionOutcome)>), PipelineError> {
        let catalog = self.fetch_catalog(source).await?;
        let choices = self.resolver.explain(&catalog.encodings, self.budget);
        Ok((catalog, choices))
    }

    /// Produce an accepted result that is within budget and owned by the caller
    #[instrument(skip(self))]
    pub async fn prepare(
        &self,
        source: &str,
        tier: QualityTier,
    ) -> Result<DownloadResult, PipelineError> {
        self.scratch
            .ensure()
            .map_err(|e| PipelineError::Scratch {
                path: self.scratch.root().to_path_buf(),
                source: e,
            })?;

        let catalog = self.fetch_catalog(source).await?;

        let id = match self.resolver.resolve(&catalog.encodings, tier, self.budget) {
            ResolutionOutcome::Chosen { id, path } => {
                info!(
                    format_id = %id,
                    rule = %path.describe(),
                    relaxed = path.is_relaxed(),
                    "Resolved encoding"
                );
                id
            }
            ResolutionOutcome::NoSuitableEncoding => {
                warn!(%tier, encodings = catalog.encodings.len(), "No suitable encoding");
                return Err(PipelineError::ResolutionEmpty);
            }
        };

        let post_process = PostProcess::for_tier(
            tier,
            self.finalizer.canonical_ext(),
            &self.audio_quality,
        );
        let job = DownloadJob {
            source,
            title: &catalog.title,
            tier,
            post_process: &post_process,
        };

        let executor = DownloadExecutor::new(Arc::clone(&self.provider), self.scratch.clone());
        let outcome = FallbackCascade::new(executor, self.budget)
            .run(&job, Selection::Exact(id))
            .await;
        debug!(trace = ?outcome.trace, "Cascade finished");

        let mut result = outcome.result?;
        if tier.is_audio() {
            result = self.finalizer.finalize(result)?;
        }

        match ResultGuard::check(result, self.budget) {
            GuardVerdict::Accept(result) => Ok(result),
            GuardVerdict::Reject { reason, size_bytes } => {
                info!(%reason, "Result rejected");
                Err(PipelineError::BudgetExceeded {
                    size_bytes,
                    budget_bytes: self.budget.bytes(),
                })
            }
        }
    }

    /// Run one request end to end; the scratch file is gone when this returns
    pub async fn run(
        &self,
        source: &str,
        tier: QualityTier,
        consumer: &dyn Consumer,
    ) -> Result<DeliveryReport, PipelineError> {
        let result = self.prepare(source, tier).await?;
        let report = DeliveryReport::from_result(&result);

        let delivered = consumer.deliver(&result).await;
        if let Err(e) = &delivered {
            warn!(error = %e, "Delivery failed");
        }

        let path = result.file.path().to_path_buf();
        if result.file.remove() {
            debug!(path = %path.display(), "Scratch file removed after delivery");
        }

        delivered?;
        Ok(report)
    }
}

/// The one human-readable message for an outcome
pub fn outcome_message(outcome: &Result<DeliveryReport, PipelineError>) -> String {
    match outcome {
        Ok(report) if report.is_fallback() => format!(
            "Sent \"{}\" ({}), but {} was not available: this is the best available quality",
            report.title,
            format_megabytes(report.size_bytes),
            report.requested_tier
        ),
        Ok(report) => format!(
            "Sent \"{}\" ({}, {})",
            report.title,
            format_megabytes(report.size_bytes),
            report.achieved_tier
        ),
        Err(PipelineError::CatalogFetch(e)) => match e.blocking_reason() {
            Some(reason) => format!("Could not get video information: {}", reason.description()),
            None => format!("Could not get video information: {}", e),
        },
        Err(PipelineError::ResolutionEmpty) => {
            "No suitable format found for the requested quality".to_string()
        }
        Err(PipelineError::FallbackExhausted { fallback, .. }) => match fallback.reason {
            Some(reason) => format!("Download failed: {}", reason.description()),
            None => format!("Download failed: {}", fallback.message),
        },
        Err(PipelineError::BudgetExceeded {
            size_bytes,
            budget_bytes,
        }) => format!(
            "File size ({}) exceeds the limit ({})",
            format_megabytes(*size_bytes),
            format_limit(*budget_bytes)
        ),
        Err(PipelineError::FinalizationMissing { .. }) => {
            "Audio file missing after conversion".to_string()
        }
        Err(PipelineError::Delivery(e)) => format!("Upload failed: {}", e),
        Err(PipelineError::Scratch { source, .. }) => format!("Storage error: {}", source),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::downloader::testing::{audio, catalog, muxed, FakeConsumer, FakeProvider, Step};

    fn context(provider: Arc<FakeProvider>, dir: &Path, budget_bytes: u64) -> PipelineContext {
        PipelineContext::new(
            provider,
            QualityResolver::default(),
            SizeBudget::new(budget_bytes).unwrap(),
            ScratchDir::new(dir),
        )
    }

    fn scratch_is_empty(dir: &Path) -> bool {
        fs::read_dir(dir).unwrap().count() == 0
    }

    #[tokio::test]
    async fn test_scenario_a_exact_height_delivered() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeProvider::new(vec![Step::Write("mp4", 10_000)]).with_catalog(catalog(vec![
                muxed("18", 360, Some(10_000)),
                muxed("22", 720, Some(80_000)),
            ])),
        );
        let consumer = FakeConsumer::default();

        let outcome = context(provider.clone(), tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::P360, &consumer)
            .await;

        let report = outcome.unwrap();
        assert_eq!(report.achieved_tier, AchievedTier::Requested(QualityTier::P360));
        assert_eq!(report.size_bytes, 10_000);
        assert_eq!(provider.selectors(), vec!["18"]);

        let deliveries = consumer.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].2, "file must exist while being delivered");
        assert!(!deliveries[0].0.exists());
        assert!(scratch_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_scenario_b_relaxed_pick_rejected_by_guard() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeProvider::new(vec![Step::Write("mp4", 80_000)])
                .with_catalog(catalog(vec![muxed("22", 720, Some(80_000))])),
        );
        let consumer = FakeConsumer::default();

        let outcome = context(provider.clone(), tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::P360, &consumer)
            .await;

        assert!(matches!(
            outcome,
            Err(PipelineError::BudgetExceeded {
                size_bytes: 80_000,
                budget_bytes: 50_000
            })
        ));
        assert_eq!(provider.selectors(), vec!["22"]);
        assert!(consumer.deliveries().is_empty());
        assert!(scratch_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_scenario_c_oversized_audio_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeProvider::new(vec![Step::Write("mp3", 60_000)])
                .with_catalog(catalog(vec![audio("140", 128.0, Some(60_000))])),
        );

        let outcome = context(provider.clone(), tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::Audio, &FakeConsumer::default())
            .await;

        assert!(matches!(
            outcome,
            Err(PipelineError::BudgetExceeded { size_bytes: 60_000, .. })
        ));
        assert_eq!(provider.selectors(), vec!["140"]);
        assert!(scratch_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_scenario_d_fallback_reported_with_caveat() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeProvider::new(vec![
                Step::Fail("ERROR: [youtube] abc: Requested format is not available"),
                Step::Write("mp4", 1_000),
            ])
            .with_catalog(catalog(vec![muxed("18", 360, Some(1_000))])),
        );

        let outcome = context(provider.clone(), tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::P360, &FakeConsumer::default())
            .await;

        let report = outcome.as_ref().unwrap();
        assert_eq!(report.achieved_tier, AchievedTier::BestAvailableFallback);
        assert_eq!(report.requested_tier, QualityTier::P360);
        assert!(outcome_message(&outcome).contains("best available"));
        assert!(scratch_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_catalog_failure_is_not_resolution_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new(vec![]));

        let outcome = context(provider.clone(), tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::P360, &FakeConsumer::default())
            .await;

        assert!(matches!(outcome, Err(PipelineError::CatalogFetch(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_resolution_never_downloads() {
        let tmp = tempfile::tempdir().unwrap();
        let mut video_only = muxed("137", 1080, Some(10));
        video_only.has_audio = false;
        let provider =
            Arc::new(FakeProvider::new(vec![]).with_catalog(catalog(vec![video_only])));

        let outcome = context(provider.clone(), tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::P720, &FakeConsumer::default())
            .await;

        assert!(matches!(outcome, Err(PipelineError::ResolutionEmpty)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_audio_container_renamed_before_delivery() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeProvider::new(vec![Step::Write("webm", 500)])
                .with_catalog(catalog(vec![audio("251", 160.0, Some(500))])),
        );
        let consumer = FakeConsumer::default();

        let outcome = context(provider.clone(), tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::Audio, &consumer)
            .await;

        assert!(outcome.is_ok());
        let deliveries = consumer.deliveries();
        assert!(deliveries[0].0.to_string_lossy().ends_with(".mp3"));
        assert_eq!(deliveries[0].1, 500);
        assert!(provider.post_processes()[0] != PostProcess::None);
        assert!(scratch_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_unknown_audio_container_is_finalization_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeProvider::new(vec![Step::Write("aac", 500)])
                .with_catalog(catalog(vec![audio("140", 128.0, Some(500))])),
        );

        let outcome = context(provider, tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::Audio, &FakeConsumer::default())
            .await;

        assert!(matches!(outcome, Err(PipelineError::FinalizationMissing { .. })));
        assert_eq!(
            outcome_message(&outcome),
            "Audio file missing after conversion"
        );
        assert!(scratch_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_delivery_failure_still_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeProvider::new(vec![Step::Write("mp4", 100)])
                .with_catalog(catalog(vec![muxed("18", 360, Some(100))])),
        );
        let consumer = FakeConsumer::failing("upload timed out");

        let outcome = context(provider, tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::P360, &consumer)
            .await;

        assert!(matches!(outcome, Err(PipelineError::Delivery(_))));
        assert_eq!(consumer.deliveries().len(), 1);
        assert!(scratch_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_fallback_exhausted_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeProvider::new(vec![
                Step::Fail("ERROR: HTTP Error 403: Forbidden"),
                Step::Fail("ERROR: HTTP Error 403: Forbidden"),
            ])
            .with_catalog(catalog(vec![muxed("18", 360, Some(100))])),
        );

        let outcome = context(provider.clone(), tmp.path(), 50_000)
            .run("https://example.com/v", QualityTier::P360, &FakeConsumer::default())
            .await;

        assert!(matches!(outcome, Err(PipelineError::FallbackExhausted { .. })));
        assert_eq!(provider.calls(), 2);
        assert!(outcome_message(&outcome).starts_with("Download failed: "));
        assert!(scratch_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_inspect_explains_every_tier() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new(vec![]).with_catalog(catalog(vec![
            muxed("18", 360, Some(100)),
            audio("140", 128.0, Some(50)),
        ])));

        let (catalog, choices) = context(provider.clone(), tmp.path(), 50_000)
            .inspect("https://example.com/v")
            .await
            .unwrap();

        assert_eq!(catalog.title, "Test Clip");
        assert_eq!(choices.len(), QualityTier::ALL.len());
        assert!(choices.iter().all(|(_, outcome)| outcome.id().is_some()));
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_budget_message_matches_user_format() {
        let outcome: Result<DeliveryReport, PipelineError> = Err(PipelineError::BudgetExceeded {
            size_bytes: 80 * 1024 * 1024,
            budget_bytes: 50 * 1024 * 1024,
        });
        assert_eq!(
            outcome_message(&outcome),
            "File size (80.0MB) exceeds the limit (50MB)"
        );
    }

    #[test]
    fn test_budget_message_under_a_megabyte() {
        let outcome: Result<DeliveryReport, PipelineError> = Err(PipelineError::BudgetExceeded {
            size_bytes: 80_000,
            budget_bytes: 50_000,
        });
        let message = outcome_message(&outcome);
        assert!(!message.contains("(0MB)"));
        assert_eq!(message, "File size (0.1MB) exceeds the limit (48.8KB)");
    }
}
