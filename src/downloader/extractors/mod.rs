// yt-dlp backed catalog provider
//
// Two invocation modes share one implementation:
// - Python mode: `python3 -m yt_dlp` (interpreter overridable via YTDLP_PYTHON)
// - CLI mode: native `yt-dlp` binary (faster, no Python dependency)

mod config;
mod diagnostics;
mod ytdlp;

pub use config::{ExtractorConfig, ExtractorMode};
pub use diagnostics::{diagnose_error, BlockingReason};
pub use ytdlp::{parse_progress, YtDlpProvider};
