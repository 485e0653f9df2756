//! HLS to MP4 conversion endpoints.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::info;

use mediahub_core::proxy::CHUNK_SIZE;
use mediahub_core::transcode::sanitize_component;
use mediahub_core::{TaskStatus, TranscodeRequest, TranscodeTask};

use super::error::ApiError;
use super::extract::{JsonBody, Path};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub success: bool,
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Serialize)]
pub struct ConvertStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<TranscodeTask> for ConvertStatusResponse {
    fn from(task: TranscodeTask) -> Self {
        Self {
            download_url: task.download_url(),
            task_id: task.task_id,
            status: task.status,
            progress: task.progress,
            started_at: task.started_at,
            error: task.error,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /videos/convert
///
/// Registers a task and returns immediately; the worker runs detached from
/// the request.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<TranscodeRequest>,
) -> Result<(StatusCode, Json<ConvertResponse>), ApiError> {
    let task = state.transcoder().submit(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ConvertResponse {
            success: true,
            task_id: task.task_id,
            status: task.status,
        }),
    ))
}

/// GET /videos/convert/status/{task_id}
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<ConvertStatusResponse>, ApiError> {
    let task = state.transcoder().status(&task_id).await?;
    Ok(Json(ConvertStatusResponse::from(task)))
}

/// GET /videos/download/{series_id}/{episode_id}.mp4
///
/// Streams the finished file as an attachment. Removal is scheduled once the
/// file is open; the grace period lets the body flush.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((series_id, file_name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let episode_id = file_name
        .strip_suffix(".mp4")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::not_found(format!("no such download: {}", file_name)))?;

    let path = state
        .transcoder()
        .finished_output(&series_id, episode_id)
        .await?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::not_found(format!("no such download: {}", file_name)))?;
    let length = file.metadata().await.map(|m| m.len()).ok();

    info!(path = %path.display(), "Serving converted video");
    state.transcoder().schedule_cleanup(path);

    let disposition = format!(
        "attachment; filename=\"{}.mp4\"",
        sanitize_component(episode_id)
    );
    let mut response = (
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE)),
    )
        .into_response();
    if let Some(length) = length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, length.into());
    }
    Ok(response)
}
