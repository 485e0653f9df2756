use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderName, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::Response;
use tracing::{debug, warn};

use crate::config::{Config, Domain, DownloadConfig, FetchConfig, SourceConfig};
use crate::fetch::{Bootstrap, FetchSession, RequestOptions, SessionError, TimeoutClass};

use super::playlist::{is_playlist, rewrite_playlist};
use super::{validate_target, ProxyError};

/// Largest body chunk forwarded at once.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Upstream headers mirrored on proxied video responses.
pub const FORWARDED_HEADERS: [HeaderName; 4] =
    [CONTENT_TYPE, CONTENT_LENGTH, ACCEPT_RANGES, CONTENT_RANGE];

const FALLBACK_ID: &str = "proxy";

#[derive(Debug)]
struct Route {
    session: FetchSession,
    download: DownloadConfig,
    bootstrap: Bootstrap,
}

impl Route {
    fn new(source: &SourceConfig, policy: &FetchConfig) -> Result<Self, SessionError> {
        Ok(Self {
            session: FetchSession::new(source, policy)?,
            download: source.download.clone(),
            bootstrap: Bootstrap::new(),
        })
    }

    fn options(&self, timeout: TimeoutClass) -> RequestOptions {
        let mut options = RequestOptions::new().timeout(timeout);
        if let Some(referer) = &self.download.referer {
            options = options.referer(referer.clone());
        }
        for (name, value) in &self.download.headers {
            options = options.header(name.clone(), value.clone());
        }
        options
    }

    /// Best-effort cookie visit; failures only get logged.
    async fn bootstrap(&self) {
        let Some(cookie_url) = self.download.cookie_url.as_deref() else {
            return;
        };
        let ok = self
            .bootstrap
            .ensure(|| async { self.session.get(cookie_url).await.is_some() })
            .await;
        if !ok {
            warn!(source = %self.session.source_id(), cookie_url, "Cookie bootstrap failed");
        }
    }
}

/// Fetched image bytes.
#[derive(Debug, Clone)]
pub struct ProxiedImage {
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Result of a video proxy request.
#[derive(Debug)]
pub enum ProxiedVideo {
    /// A playlist with every URI made absolute.
    Playlist(String),
    /// An open upstream response whose body is still unread.
    Stream(Response),
}

/// Per-source sessions for media fetches.
#[derive(Debug)]
pub struct MediaProxy {
    routes: HashMap<String, Arc<Route>>,
    fallback: Arc<Route>,
}

impl MediaProxy {
    /// One session per source row; media fetches are not paced.
    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        let policy = FetchConfig {
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..config.fetch.clone()
        };
        let mut routes = HashMap::new();
        for source in &config.sources {
            routes.insert(source.id.clone(), Arc::new(Route::new(source, &policy)?));
        }
        let fallback_row = SourceConfig {
            id: FALLBACK_ID.to_string(),
            name: FALLBACK_ID.to_string(),
            description: String::new(),
            base_url: "http://localhost/".to_string(),
            domain: Domain::Video,
            enabled: true,
            proxy: None,
            download: DownloadConfig::default(),
            options: Default::default(),
        };
        Ok(Self {
            routes,
            fallback: Arc::new(Route::new(&fallback_row, &policy)?),
        })
    }

    fn route(&self, source: Option<&str>) -> Result<&Route, ProxyError> {
        match source.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(&self.fallback),
            Some(id) => self
                .routes
                .get(id)
                .map(Arc::as_ref)
                .ok_or_else(|| ProxyError::UnknownSource(id.to_string())),
        }
    }

    /// Fetch an image with the source's Referer, headers and cookies.
    pub async fn image(&self, target: &str, source: Option<&str>) -> Result<ProxiedImage, ProxyError> {
        let url = validate_target(target)?;
        let route = self.route(source)?;
        route.bootstrap().await;

        let (headers, body) = route
            .session
            .get_bytes(url.as_str(), &route.options(TimeoutClass::Page))
            .await
            .ok_or_else(|| ProxyError::Upstream(url.to_string()))?;
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(url = %url, bytes = body.len(), "Proxied image");
        Ok(ProxiedImage { content_type, body })
    }

    /// Open a video target, forwarding `range`.
    ///
    /// Playlists are buffered and rewritten; anything else is returned open
    /// so the caller can stream the body.
    pub async fn video(
        &self,
        target: &str,
        source: Option<&str>,
        range: Option<&str>,
    ) -> Result<ProxiedVideo, ProxyError> {
        let url = validate_target(target)?;
        let route = self.route(source)?;

        let mut options = route.options(TimeoutClass::Stream);
        if let Some(range) = range {
            options = options.header(RANGE.as_str(), range);
        }
        let response = route
            .session
            .open(url.as_str(), &options)
            .await
            .ok_or_else(|| ProxyError::Upstream(url.to_string()))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        if !is_playlist(&url, content_type) {
            return Ok(ProxiedVideo::Stream(response));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|_| ProxyError::Upstream(url.to_string()))?;
        Ok(ProxiedVideo::Playlist(rewrite_playlist(&body, &final_url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::upstream::{serve, source_row};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn fixture(bootstraps: Arc<AtomicUsize>) -> (MediaProxy, String) {
        let router = Router::new()
            .route(
                "/img.jpg",
                get(|headers: HeaderMap| async move {
                    let referer = headers.get("referer").and_then(|v| v.to_str().ok());
                    let cookie = headers.get("cookie").and_then(|v| v.to_str().ok());
                    if referer == Some("https://site.example/") && cookie == Some("sid=1") {
                        (StatusCode::OK, [("content-type", "image/jpeg")], "JPEGDATA").into_response()
                    } else {
                        (StatusCode::FORBIDDEN, [("content-type", "text/plain")], "no").into_response()
                    }
                }),
            )
            .route(
                "/home",
                get(move || {
                    let bootstraps = Arc::clone(&bootstraps);
                    async move {
                        bootstraps.fetch_add(1, Ordering::SeqCst);
                        ([("set-cookie", "sid=1; Path=/")], "home")
                    }
                }),
            )
            .route(
                "/v.mp4",
                get(|headers: HeaderMap| async move {
                    let range = headers.get("range").and_then(|v| v.to_str().ok()).unwrap_or("");
                    if range == "bytes=0-3" {
                        (
                            StatusCode::PARTIAL_CONTENT,
                            [("content-type", "video/mp4"), ("content-range", "bytes 0-3/10")],
                            "0123",
                        )
                            .into_response()
                    } else {
                        (
                            StatusCode::OK,
                            [("content-type", "video/mp4"), ("accept-ranges", "bytes")],
                            "0123456789",
                        )
                            .into_response()
                    }
                }),
            )
            .route(
                "/hls/index.m3u8",
                get(|| async { "#EXTM3U\n#EXTINF:10,\nseg-0.ts\n#EXT-X-ENDLIST\n" }),
            );
        let base = serve(router).await;

        let mut source = source_row("site", Domain::Comic, &base);
        source.download = DownloadConfig {
            referer: Some("https://site.example/".to_string()),
            cookie_url: Some(format!("{}/home", base)),
            headers: Default::default(),
        };
        let config = Config {
            sources: vec![source],
            ..Config::default()
        };
        (MediaProxy::from_config(&config).unwrap(), base)
    }

    #[tokio::test]
    async fn test_image_uses_referer_and_bootstrap_cookie() {
        let bootstraps = Arc::new(AtomicUsize::new(0));
        let (proxy, base) = fixture(Arc::clone(&bootstraps)).await;
        let target = format!("{}/img.jpg", base);

        for _ in 0..2 {
            let image = proxy.image(&target, Some("site")).await.unwrap();
            assert_eq!(image.content_type.as_deref(), Some("image/jpeg"));
            assert_eq!(&image.body[..], b"JPEGDATA");
        }
        assert_eq!(bootstraps.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_without_source_is_rejected_upstream() {
        let (proxy, base) = fixture(Arc::new(AtomicUsize::new(0))).await;
        let err = proxy
            .image(&format!("{}/img.jpg", base), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_unknown_source_and_bad_target() {
        let (proxy, base) = fixture(Arc::new(AtomicUsize::new(0))).await;
        assert!(matches!(
            proxy.image(&format!("{}/img.jpg", base), Some("nope")).await,
            Err(ProxyError::UnknownSource(_))
        ));
        assert!(matches!(
            proxy.video("file:///etc/passwd", Some("site"), None).await,
            Err(ProxyError::BadTarget)
        ));
    }

    #[tokio::test]
    async fn test_video_range_is_forwarded() {
        let (proxy, base) = fixture(Arc::new(AtomicUsize::new(0))).await;
        let video = proxy
            .video(&format!("{}/v.mp4", base), Some("site"), Some("bytes=0-3"))
            .await
            .unwrap();
        let ProxiedVideo::Stream(response) = video else {
            panic!("expected a stream");
        };
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()["content-range"], "bytes 0-3/10");
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"0123");
    }

    #[tokio::test]
    async fn test_playlist_is_rewritten() {
        let (proxy, base) = fixture(Arc::new(AtomicUsize::new(0))).await;
        let video = proxy
            .video(&format!("{}/hls/index.m3u8", base), Some("site"), None)
            .await
            .unwrap();
        let ProxiedVideo::Playlist(body) = video else {
            panic!("expected a playlist");
        };
        assert!(body.contains(&format!("\n{}/hls/seg-0.ts\n", base)));
    }
}
