//! Types for the transcode module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Body of `POST /videos/convert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeRequest {
    pub m3u8_url: String,
    pub episode_id: String,
    pub series_id: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// A transcode job as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeTask {
    pub task_id: String,
    pub episode_id: String,
    pub series_id: String,
    pub source: String,
    pub m3u8_url: String,
    pub output_path: PathBuf,
    pub status: TaskStatus,
    /// Fraction done, in `[0, 1]`.
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscodeTask {
    /// A processing task whose output lives under `output_dir`.
    pub fn new(request: &TranscodeRequest, output_dir: &Path) -> Self {
        let task_id = uuid::Uuid::new_v4().to_string();
        let output_path = output_path(
            output_dir,
            &request.series_id,
            &request.episode_id,
            &task_id,
        );
        Self {
            task_id,
            episode_id: request.episode_id.clone(),
            series_id: request.series_id.clone(),
            source: request.source.clone(),
            m3u8_url: request.m3u8_url.clone(),
            output_path,
            status: TaskStatus::Processing,
            progress: 0.0,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Whether the task was submitted for this episode. Ids are compared
    /// after sanitizing, as they appear in download URLs.
    pub fn is_for(&self, series_id: &str, episode_id: &str) -> bool {
        sanitize_component(&self.series_id) == sanitize_component(series_id)
            && sanitize_component(&self.episode_id) == sanitize_component(episode_id)
    }

    /// Download path relative to the server root, once completed.
    pub fn download_url(&self) -> Option<String> {
        (self.status == TaskStatus::Completed).then(|| {
            format!(
                "/videos/download/{}/{}.mp4",
                sanitize_component(&self.series_id),
                sanitize_component(&self.episode_id)
            )
        })
    }
}

/// Make an id safe to use as a single path component.
pub fn sanitize_component(id: &str) -> String {
    let cleaned: String = id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `{output_dir}/{series}/{episode}.{task_id}.mp4`
///
/// The task id keeps every job's file apart, including ids that only differ
/// before sanitizing.
pub fn output_path(output_dir: &Path, series_id: &str, episode_id: &str, task_id: &str) -> PathBuf {
    output_dir.join(sanitize_component(series_id)).join(format!(
        "{}.{}.mp4",
        sanitize_component(episode_id),
        sanitize_component(task_id)
    ))
}
