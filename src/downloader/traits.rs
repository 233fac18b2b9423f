// Collaborator traits: catalog provider, consumer, authorization gate

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;

use super::errors::{DeliveryError, ProviderError};
use super::models::{DownloadResult, MediaCatalog, PostProcess, Selection};
use super::scratch::ScratchSlot;

/// One materialization request handed to the provider
#[derive(Debug)]
pub struct MaterializeRequest<'a> {
    pub source: &'a str,
    pub selection: &'a Selection,
    /// Base name the provider must write under
    pub slot: &'a ScratchSlot,
    pub post_process: &'a PostProcess,
}

/// Opaque source of format catalogs and downloads (yt-dlp or a test double)
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Name of the provider (for logging)
    fn name(&self) -> &'static str;

    /// Read-only metadata query
    async fn fetch(&self, source: &str) -> Result<MediaCatalog, ProviderError>;

    /// Write exactly one file under the request's slot and return its path
    async fn materialize(&self, request: MaterializeRequest<'_>) -> Result<PathBuf, ProviderError>;
}

/// Receives an accepted result (upload step of the front-end)
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn deliver(&self, result: &DownloadResult) -> Result<(), DeliveryError>;
}

/// Checked by the host before a request enters the pipeline
pub trait AuthorizationGate: Send + Sync {
    fn check(&self, requester: &str) -> bool;
}

/// Allow-list gate; an empty list admits everyone
#[derive(Debug, Clone, Default)]
pub struct StaticAllowList {
    allowed: HashSet<String>,
}

impl StaticAllowList {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl AuthorizationGate for StaticAllowList {
    fn check(&self, requester: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(requester)
    }
}
