//! External media extractor (`yt-dlp`).
//!
//! Used by sources whose pages need a full extractor to list or play. Every
//! call spawns the binary with a hard timeout; nothing is kept between calls.

mod ytdlp;

pub use ytdlp::{parse_json_lines, ExtractedEntry, YtDlp};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("yt-dlp not found at {path}; install yt-dlp or set extractor.binary")]
    ToolMissing { path: PathBuf },

    #[error("yt-dlp timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("yt-dlp failed with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Failed to parse yt-dlp output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
