// yt-dlp provider - catalog fetch and materialization
//
// Runs either the native `yt-dlp` binary or `python3 -m yt_dlp`:
// - fetch: `--dump-json` parsed into a MediaCatalog
// - materialize: `-f <selector>` into the request's scratch slot, with
//   `--print after_move:filepath` reporting the final file

use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::config::{ExtractorConfig, ExtractorMode};
use crate::downloader::errors::ProviderError;
use crate::downloader::models::{EncodingDescriptor, MediaCatalog, PostProcess};
use crate::downloader::traits::{CatalogProvider, MaterializeRequest};
use crate::downloader::utils::{run_output_with_timeout, run_streaming_with_timeout};

/// Format entry as it appears in yt-dlp's JSON
#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_id: String,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    abr: Option<f64>,
    tbr: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

impl RawFormat {
    fn codec_present(codec: &Option<String>) -> bool {
        codec.as_deref().is_some_and(|c| c != "none" && !c.is_empty())
    }

    fn into_descriptor(self) -> EncodingDescriptor {
        EncodingDescriptor {
            has_video: Self::codec_present(&self.vcodec),
            has_audio: Self::codec_present(&self.acodec),
            height_px: self.height,
            bitrate_kbps: self.abr.or(self.tbr),
            size_bytes: self
                .filesize
                .or(self.filesize_approx)
                .filter(|s| *s >= 0.0)
                .map(|s| s as u64),
            ext: self.ext,
            id: self.format_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    upload_date: Option<String>,
    formats: Option<Vec<RawFormat>>,
}

fn parse_upload_date(raw: &str) -> Option<time::Date> {
    let format = time::format_description::parse("[year][month][day]").ok()?;
    time::Date::parse(raw, &format).ok()
}

/// Parse yt-dlp progress line like:
/// [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32
pub fn parse_progress(line: &str) -> Option<(f32, String)> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)(?:\s+at\s+(\S+/s))?(?:\s+ETA\s+(\S+))?"
        ).unwrap();
        static ref MERGE_RE: Regex = Regex::new(r"\[Merger?\]\s+Merging").unwrap();
        static ref EXTRACT_RE: Regex = Regex::new(r"\[ExtractAudio\]\s+Destination:").unwrap();
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let size = caps.get(2).map(|m| m.as_str()).unwrap_or("?");
        let speed = caps.get(3).map(|m| m.as_str()).unwrap_or("?");
        let status = match caps.get(4) {
            Some(eta) => format!("{:.1}% of {} @ {} ETA {}", percent, size, speed, eta.as_str()),
            None => format!("{:.1}% of {} @ {}", percent, size, speed),
        };
        return Some((percent, status));
    }

    if MERGE_RE.is_match(line) {
        return Some((99.0, "Merging video and audio".to_string()));
    }

    if EXTRACT_RE.is_match(line) {
        return Some((99.0, "Extracting audio".to_string()));
    }

    None
}

/// CatalogProvider backed by yt-dlp
pub struct YtDlpProvider {
    program: String,
    prefix_args: Vec<String>,
    config: ExtractorConfig,
}

impl YtDlpProvider {
    pub fn new(config: ExtractorConfig) -> Self {
        let (program, prefix_args) = match config.mode {
            ExtractorMode::Cli => (
                config.binary.clone().unwrap_or_else(Self::find_ytdlp),
                Vec::new(),
            ),
            ExtractorMode::Python => (
                config.python.clone().unwrap_or_else(Self::find_python),
                vec!["-m".to_string(), "yt_dlp".to_string()],
            ),
        };

        Self {
            program,
            prefix_args,
            config,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Find yt-dlp binary
    fn find_ytdlp() -> String {
        let common_paths = [
            "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
            "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
            "/usr/bin/yt-dlp",          // System installation
        ];

        common_paths
            .iter()
            .find(|p| Path::new(p).exists())
            .map(|p| p.to_string())
            .unwrap_or_else(|| "yt-dlp".to_string())
    }

    /// Find Python interpreter
    fn find_python() -> String {
        if let Ok(custom) = std::env::var("YTDLP_PYTHON") {
            return custom;
        }

        let candidates = ["python3", "/opt/homebrew/bin/python3", "/usr/local/bin/python3"];
        for cmd in candidates {
            if let Ok(output) = StdCommand::new(cmd).arg("--version").output() {
                if output.status.success() {
                    return cmd.to_string();
                }
            }
        }

        "python3".to_string()
    }

    /// Arguments shared by every invocation
    fn common_args(&self) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.fetch_timeout_secs.to_string(),
            "--retries".to_string(),
            "2".to_string(),
        ]);

        if let Some(client) = &self.config.player_client {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={}", client));
        }

        if let Some(path) = &self.config.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.clone());
        }

        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }

    fn fetch_args(&self, source: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push("--dump-json".to_string());
        args.push(source.to_string());
        args
    }

    fn materialize_args(&self, request: &MaterializeRequest<'_>) -> Vec<String> {
        let mut args = self.common_args();
        args.extend([
            "-f".to_string(),
            request.selection.as_str().to_string(),
            "-o".to_string(),
            request.slot.output_template(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-part".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--no-simulate".to_string(),
        ]);

        if let PostProcess::ExtractAudio { codec, quality } = request.post_process {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                codec.clone(),
                "--audio-quality".to_string(),
                format!("{}K", quality),
            ]);
        }

        args.push(request.source.to_string());
        args
    }

    /// Parse `--dump-json` output into a catalog
    pub fn parse_catalog(stdout: &str) -> Result<MediaCatalog, ProviderError> {
        let info: RawInfo = serde_json::from_str(stdout.trim())
            .map_err(|e| ProviderError::ParseError(format!("Invalid JSON: {}", e)))?;

        let formats = info
            .formats
            .ok_or_else(|| ProviderError::ParseError("No formats array in JSON".to_string()))?;

        Ok(MediaCatalog {
            id: info.id.unwrap_or_else(|| "unknown".to_string()),
            title: info.title.unwrap_or_else(|| "Unknown".to_string()),
            uploader: info.uploader.unwrap_or_else(|| "Unknown".to_string()),
            duration_seconds: info.duration.unwrap_or(0.0).max(0.0) as u64,
            upload_date: info.upload_date.as_deref().and_then(parse_upload_date),
            encodings: formats.into_iter().map(RawFormat::into_descriptor).collect(),
        })
    }

    /// Last printed line that names a file of the slot
    fn produced_path(lines: &[String], request: &MaterializeRequest<'_>) -> Option<PathBuf> {
        lines
            .iter()
            .rev()
            .map(|l| PathBuf::from(l.trim()))
            .find(|p| request.slot.owns(p) && p.exists())
            .or_else(|| pick_leftover(request.slot.leftovers()))
    }
}

/// Finished-media extensions, most likely final output first
const OUTPUT_EXTENSIONS: [&str; 6] = ["mp4", "mp3", "webm", "m4a", "opus", "mkv"];

/// Deterministic choice among slot files when yt-dlp printed no usable path:
/// known media extensions by rank, then by name; partial files lose
fn pick_leftover(mut files: Vec<PathBuf>) -> Option<PathBuf> {
    files.sort();
    files.into_iter().min_by_key(|path| {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| OUTPUT_EXTENSIONS.iter().position(|known| *known == e))
            .unwrap_or(OUTPUT_EXTENSIONS.len())
    })
}

#[async_trait]
impl CatalogProvider for YtDlpProvider {
    fn name(&self) -> &'static str {
        match self.config.mode {
            ExtractorMode::Cli => "cli-yt-dlp",
            ExtractorMode::Python => "python-yt-dlp",
        }
    }

    async fn fetch(&self, source: &str) -> Result<MediaCatalog, ProviderError> {
        let args = self.fetch_args(source);
        debug!(program = %self.program, args = %args.join(" "), "Fetching catalog");

        let out =
            run_output_with_timeout(&self.program, &args, self.config.fetch_timeout_secs).await?;

        if !out.status.success() {
            return Err(ProviderError::from_stderr(&out.stderr));
        }

        let catalog = Self::parse_catalog(&out.stdout_lines.join("\n"))?;
        info!(
            provider = self.name(),
            id = %catalog.id,
            encodings = catalog.encodings.len(),
            "Catalog fetched"
        );
        Ok(catalog)
    }

    async fn materialize(&self, request: MaterializeRequest<'_>) -> Result<PathBuf, ProviderError> {
        let args = self.materialize_args(&request);
        debug!(program = %self.program, args = %args.join(" "), "Materializing");

        let out = run_streaming_with_timeout(
            &self.program,
            &args,
            self.config.materialize_timeout_secs,
            |line| {
                if let Some((percent, status)) = parse_progress(line) {
                    debug!(percent, "{}", status);
                }
            },
        )
        .await?;

        if !out.status.success() {
            return Err(ProviderError::from_stderr(&out.stderr));
        }

        Self::produced_path(&out.stdout_lines, &request).ok_or_else(|| {
            warn!(stem = request.slot.stem(), "yt-dlp succeeded but no file was found");
            ProviderError::ExecutionError {
                message: "provider reported success but produced no file".to_string(),
                reason: None,
            }
        })
    }
}
