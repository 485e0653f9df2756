//! Error types for the transcode module.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The transcoder binary could not be started.
    #[error("ffmpeg not found at {path}; install ffmpeg or set transcoder.ffmpeg_path")]
    ToolMissing { path: PathBuf },

    #[error("Invalid transcode request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Failed to create output directory: {path}")]
    OutputDirectoryFailed { path: PathBuf },

    /// ffmpeg exited with a non-zero status.
    #[error("Transcode failed: {reason}")]
    Failed {
        reason: String,
        stderr: Option<String>,
    },

    #[error("Transcode timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// No completed output exists for the requested episode.
    #[error("No finished file for {series_id}/{episode_id}")]
    OutputNotFound {
        series_id: String,
        episode_id: String,
    },

    /// The episode is still being converted.
    #[error("Conversion still running: {task_id}")]
    NotReady { task_id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Message stored on a failed task.
    pub fn task_message(&self) -> String {
        match self {
            Self::Failed {
                reason,
                stderr: Some(stderr),
            } if !stderr.is_empty() => format!("{}\n{}", reason, stderr),
            other => other.to_string(),
        }
    }
}
