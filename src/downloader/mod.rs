// Downloader module - size-budgeted media acquisition pipeline

pub mod cascade;
pub mod errors;
pub mod executor;
pub mod extractors;
pub mod finalizer;
pub mod guard;
pub mod models;
pub mod pipeline;
pub mod resolver;
pub mod scratch;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{DeliveryError, DownloadFailure, PipelineError, ProviderError};
pub use extractors::{BlockingReason, ExtractorConfig, ExtractorMode, YtDlpProvider};
pub use models::{AchievedTier, DownloadResult, MediaCatalog, QualityTier, SizeBudget};
pub use pipeline::{outcome_message, DeliveryReport, PipelineContext};
pub use resolver::{PriorityStep, PriorityTable, QualityResolver, ResolutionOutcome};
pub use traits::{AuthorizationGate, CatalogProvider, Consumer, StaticAllowList};
