//! Image and video proxy endpoints.
//!
//! Both reattach the source's Referer and cookies upstream and answer with a
//! permissive CORS header so players and `<img>` tags can load the media.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use mediahub_core::proxy::{ProxiedVideo, CHUNK_SIZE, FORWARDED_HEADERS, HLS_CONTENT_TYPE};

use super::error::ApiError;
use super::extract::Query;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub series_id: Option<String>,
}

fn allow_any_origin(response: &mut Response) {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
}

/// Split upstream chunks so no forwarded chunk exceeds [`CHUNK_SIZE`].
fn rechunk(mut bytes: Bytes) -> Vec<Bytes> {
    let mut pieces = Vec::with_capacity(bytes.len() / CHUNK_SIZE + 1);
    while bytes.len() > CHUNK_SIZE {
        pieces.push(bytes.split_to(CHUNK_SIZE));
    }
    if !bytes.is_empty() {
        pieces.push(bytes);
    }
    pieces
}

/// GET /proxy/image?url=&source=
pub async fn image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response, ApiError> {
    let image = state
        .proxy()
        .image(&query.url, query.source.as_deref())
        .await?;
    let content_type = image
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut response = ([(header::CONTENT_TYPE, content_type)], image.body).into_response();
    allow_any_origin(&mut response);
    Ok(response)
}

/// GET /proxy/video?url=&source=&series_id=
///
/// Forwards `Range`. Playlists come back rewritten to absolute URIs;
/// anything else is streamed with the upstream status and range headers.
pub async fn video(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    debug!(
        url = %query.url,
        source = ?query.source,
        series_id = ?query.series_id,
        range = ?range,
        "Proxying video"
    );

    let proxied = state
        .proxy()
        .video(&query.url, query.source.as_deref(), range)
        .await?;

    let mut response = match proxied {
        ProxiedVideo::Playlist(body) => {
            ([(header::CONTENT_TYPE, HLS_CONTENT_TYPE)], body).into_response()
        }
        ProxiedVideo::Stream(upstream) => {
            let status =
                StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::OK);
            let mut forwarded = HeaderMap::new();
            for name in FORWARDED_HEADERS {
                if let Some(value) = upstream.headers().get(&name) {
                    forwarded.insert(name, value.clone());
                }
            }
            let body = upstream.bytes_stream().flat_map(|chunk| {
                let pieces: Vec<Result<Bytes, reqwest::Error>> = match chunk {
                    Ok(bytes) => rechunk(bytes).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                futures::stream::iter(pieces)
            });
            (status, forwarded, Body::from_stream(body)).into_response()
        }
    };
    allow_any_origin(&mut response);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rechunk_bounds_chunks() {
        let pieces = rechunk(Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 10]));
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.len() <= CHUNK_SIZE));
        assert_eq!(pieces[2].len(), 10);
        assert!(rechunk(Bytes::new()).is_empty());
    }
}
