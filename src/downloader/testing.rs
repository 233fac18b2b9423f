// Scripted provider and consumer doubles for pipeline tests

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use super::errors::{DeliveryError, ProviderError};
use super::models::{DownloadResult, EncodingDescriptor, MediaCatalog, PostProcess};
use super::traits::{CatalogProvider, Consumer, MaterializeRequest};

/// What the fake provider does on its next materialize call
#[derive(Debug, Clone)]
pub enum Step {
    /// Write `size` bytes to `<slot>.<ext>` and report that path
    Write(&'static str, u64),
    /// Fail with the given stderr text
    Fail(&'static str),
}

pub struct FakeProvider {
    catalog: Option<MediaCatalog>,
    steps: Mutex<VecDeque<Step>>,
    selectors: Mutex<Vec<String>>,
    post_processes: Mutex<Vec<PostProcess>>,
}

impl FakeProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            catalog: None,
            steps: Mutex::new(steps.into()),
            selectors: Mutex::new(Vec::new()),
            post_processes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_catalog(mut self, catalog: MediaCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn selectors(&self) -> Vec<String> {
        self.selectors.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.selectors.lock().unwrap().len()
    }

    pub fn post_processes(&self) -> Vec<PostProcess> {
        self.post_processes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(&self, _source: &str) -> Result<MediaCatalog, ProviderError> {
        self.catalog
            .clone()
            .ok_or_else(|| ProviderError::from_stderr("ERROR: [generic] Unsupported URL"))
    }

    async fn materialize(&self, request: MaterializeRequest<'_>) -> Result<PathBuf, ProviderError> {
        self.selectors
            .lock()
            .unwrap()
            .push(request.selection.as_str().to_string());
        self.post_processes
            .lock()
            .unwrap()
            .push(request.post_process.clone());

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Fail("ERROR: script exhausted"));

        match step {
            Step::Write(ext, size) => {
                let path = request.slot.path_with_ext(ext);
                std::fs::write(&path, vec![0u8; size as usize]).unwrap();
                Ok(path)
            }
            Step::Fail(stderr) => Err(ProviderError::from_stderr(stderr)),
        }
    }
}

/// Records what it was handed; optionally fails
#[derive(Default)]
pub struct FakeConsumer {
    pub fail_with: Option<&'static str>,
    pub delivered: Mutex<Vec<(PathBuf, u64, bool)>>,
}

impl FakeConsumer {
    pub fn failing(message: &'static str) -> Self {
        Self {
            fail_with: Some(message),
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> Vec<(PathBuf, u64, bool)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Consumer for FakeConsumer {
    async fn deliver(&self, result: &DownloadResult) -> Result<(), DeliveryError> {
        let exists = result.file.path().exists();
        self.delivered
            .lock()
            .unwrap()
            .push((result.file.path().to_path_buf(), result.size_bytes, exists));
        match self.fail_with {
            Some(message) => Err(DeliveryError::Rejected(message.to_string())),
            None => Ok(()),
        }
    }
}

/// Muxed rendition with known height and size
pub fn muxed(id: &str, height: u32, size: Option<u64>) -> EncodingDescriptor {
    EncodingDescriptor {
        id: id.to_string(),
        ext: Some("mp4".to_string()),
        has_video: true,
        has_audio: true,
        height_px: Some(height),
        bitrate_kbps: None,
        size_bytes: size,
    }
}

/// Audio-only rendition
pub fn audio(id: &str, kbps: f64, size: Option<u64>) -> EncodingDescriptor {
    EncodingDescriptor {
        id: id.to_string(),
        ext: Some("m4a".to_string()),
        has_video: false,
        has_audio: true,
        height_px: None,
        bitrate_kbps: Some(kbps),
        size_bytes: size,
    }
}

pub fn catalog(encodings: Vec<EncodingDescriptor>) -> MediaCatalog {
    MediaCatalog {
        id: "abc123".to_string(),
        title: "Test Clip".to_string(),
        uploader: "tester".to_string(),
        duration_seconds: 125,
        upload_date: None,
        encodings,
    }
}
