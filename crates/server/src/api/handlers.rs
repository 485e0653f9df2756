use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use mediahub_core::{Domain, SanitizedConfig, SourceMeta};

use super::error::ApiError;
use super::extract::Query;
use crate::metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

#[derive(Debug, Default, Deserialize)]
pub struct SourcesQuery {
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceMeta>,
    pub total: usize,
}

/// GET /sources?domain=
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourcesQuery>,
) -> Result<Json<SourcesResponse>, ApiError> {
    let domain = match query.domain.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(value.parse::<Domain>().map_err(ApiError::bad_request)?),
    };
    let sources = state.sources().list(domain);
    Ok(Json(SourcesResponse {
        total: sources.len(),
        sources,
    }))
}

/// GET /metrics
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    metrics::collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}
