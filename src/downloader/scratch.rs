// Scratch storage - per-request files that never outlive the request
//
// A `ScratchSlot` reserves a unique base name inside the scratch directory.
// Everything the provider writes under that base name (partials, intermediate
// containers, the final file) is swept when the slot is dropped, so abandoned
// or failed requests leave nothing behind. A `ScratchFile` owns the one file
// handed to the consumer and deletes it exactly once.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, warn};

// Leaves room under NAME_MAX (255 bytes) for the slot suffix and extensions
const MAX_TITLE_BYTES: usize = 100;

static SLOT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Root directory for scratch files
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Reserve a base name derived from the title plus a collision-avoidance suffix
    pub fn allocate(&self, title: &str) -> ScratchSlot {
        let seq = SLOT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() as u64;
        let stem = format!(
            "{}-{:x}{:x}-{}",
            sanitize_title(title),
            nanos,
            std::process::id(),
            seq
        );

        ScratchSlot {
            dir: self.root.clone(),
            stem,
        }
    }
}

/// Make a title safe to use as a file name
pub fn sanitize_title(title: &str) -> String {
    lazy_static::lazy_static! {
        static ref UNSAFE_RE: Regex = Regex::new(r#"[\\/:*?"<>|\x00-\x1f]+"#).unwrap();
        static ref SPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    }

    let cleaned = UNSAFE_RE.replace_all(title, "_");
    let cleaned = SPACE_RE.replace_all(&cleaned, " ");
    let trimmed = truncate_bytes(cleaned.trim(), MAX_TITLE_BYTES)
        .trim_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() {
        "media".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// A reserved base name; sweeps every file sharing it on drop
#[derive(Debug)]
pub struct ScratchSlot {
    dir: PathBuf,
    stem: String,
}

impl ScratchSlot {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Output template in yt-dlp syntax, e.g. `/tmp/x/Title-1a2b-0.%(ext)s`
    pub fn output_template(&self) -> String {
        self.dir
            .join(format!("{}.%(ext)s", self.stem))
            .to_string_lossy()
            .into_owned()
    }

    pub fn path_with_ext(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, ext))
    }

    /// Whether the path is named after this slot
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| self.matches_name(n))
    }

    fn matches_name(&self, name: &str) -> bool {
        name.strip_prefix(self.stem.as_str())
            .is_some_and(|rest| rest.starts_with('.'))
    }

    /// Files currently on disk under this slot's base name
    pub fn leftovers(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_str().is_some_and(|n| self.matches_name(n)))
            .map(|entry| entry.path())
            .collect()
    }

    /// Remove every leftover file; returns how many were removed
    pub fn sweep(&self) -> usize {
        self.leftovers()
            .iter()
            .filter(|path| delete_quietly(path))
            .count()
    }
}

impl Drop for ScratchSlot {
    fn drop(&mut self) {
        let removed = self.sweep();
        if removed > 0 {
            debug!(stem = %self.stem, removed, "Swept scratch leftovers");
        }
    }
}

/// Best-effort delete; failures are logged, never propagated
pub fn delete_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Deleted scratch file");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to delete scratch file");
            false
        }
    }
}

/// The materialized file of one request; deleted exactly once
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    removed: bool,
    slot: ScratchSlot,
}

impl ScratchFile {
    pub fn new(path: PathBuf, slot: ScratchSlot) -> Self {
        Self {
            path,
            removed: false,
            slot,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn slot(&self) -> &ScratchSlot {
        &self.slot
    }

    pub fn size_on_disk(&self) -> io::Result<u64> {
        fs::metadata(&self.path).map(|m| m.len())
    }

    /// Rename the file on disk and track the new path
    pub fn rename_to(&mut self, target: PathBuf) -> io::Result<()> {
        fs::rename(&self.path, &target)?;
        self.path = target;
        Ok(())
    }

    /// Point at a different file of the same slot without touching the disk
    pub fn adopt(&mut self, path: PathBuf) {
        self.path = path;
    }

    /// Delete now; the slot sweep still runs when `self` is dropped
    pub fn remove(mut self) -> bool {
        self.removed = true;
        delete_quietly(&self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.removed {
            self.removed = true;
            delete_quietly(&self.path);
        }
    }
}
