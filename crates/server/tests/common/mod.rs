//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock sources registered in every domain, enabling E2E testing of
//! the façade without reaching any upstream site.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use mediahub_core::testing::{
    MockComicSource, MockEbookSource, MockPodcastSource, MockVideoSource,
};
use mediahub_core::{
    CacheConfig, ComicSource, Config, Domain, EbookSource, MediaProxy, PodcastSource,
    SourceFactories, SourceMeta, TranscoderConfig, VideoSource, WarmupConfig,
};
use mediahub_server::state::AppState;

/// Re-export fixtures for test convenience
pub use mediahub_core::testing::fixtures;

/// Id every mock is registered under; also the default of each domain.
pub const MOCK_SOURCE: &str = "mock";

/// A registered but disabled comic source.
pub const DISABLED_SOURCE: &str = "off";

/// Test fixture for E2E testing with mock sources.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_hot_comics() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.get("/comics/hot?limit=2").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state behind the router
    pub state: Arc<AppState>,
    pub comics: Arc<MockComicSource>,
    pub ebooks: Arc<MockEbookSource>,
    pub podcasts: Arc<MockPodcastSource>,
    pub videos: Arc<MockVideoSource>,
    /// Temporary directory holding transcoder output
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Response with the raw body, for binary endpoints
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Turn the response cache off
    pub disable_cache: bool,
    /// Point the transcoder at an ffmpeg that exists
    pub ffmpeg_path: Option<PathBuf>,
}

impl TestConfig {
    pub fn without_cache() -> Self {
        Self {
            disable_cache: true,
            ..Default::default()
        }
    }
}

fn meta(id: &str, domain: Domain, enabled: bool) -> SourceMeta {
    SourceMeta {
        id: id.to_string(),
        name: format!("Mock {}", domain.as_str()),
        description: String::new(),
        enabled,
        domain,
    }
}

fn comic_source() -> MockComicSource {
    MockComicSource::new(MOCK_SOURCE)
        .with_categories(fixtures::categories(&[("action", "Action"), ("romance", "Romance")]))
        .with_comics(vec![
            fixtures::comic("c1", "Sky Pirates"),
            fixtures::comic("c2", "Deep Sea"),
            fixtures::comic("c3", "Sky Garden"),
        ])
        .with_chapters(
            "c1",
            vec![
                fixtures::comic_chapter("c1", 1),
                fixtures::comic_chapter("c1", 2),
            ],
        )
        .with_images("c1_1", fixtures::image_set(3))
}

fn ebook_source() -> MockEbookSource {
    MockEbookSource::new(MOCK_SOURCE)
        .with_categories(fixtures::categories(&[("fantasy", "Fantasy"), ("history", "History")]))
        .with_books(vec![
            fixtures::book("b1", "The Long Road", "fantasy"),
            fixtures::book("b2", "Winter Court", "fantasy"),
            fixtures::book("b3", "Old Dynasties", "history"),
        ])
        .with_chapters(
            "b1",
            vec![fixtures::book_chapter("b1", 1), fixtures::book_chapter("b1", 2)],
        )
        .with_content(fixtures::chapter_content(
            "b1_1",
            &["It was raining.", "Nobody came."],
        ))
}

fn podcast_source() -> MockPodcastSource {
    MockPodcastSource::new(MOCK_SOURCE)
        .with_categories(fixtures::categories(&[("history", "History")]))
        .with_programs(vec![
            fixtures::program("p1", "Night Stories"),
            fixtures::program("p2", "Morning Talk"),
        ])
        .with_episodes(
            "p1",
            vec![fixtures::episode("p1", 1), fixtures::episode("p1", 2)],
        )
        .with_episode_detail(fixtures::episode_detail(
            "p1_1",
            "https://audio.example/p1/1.mp3",
        ))
}

fn video_source() -> MockVideoSource {
    MockVideoSource::new(MOCK_SOURCE)
        .with_categories(fixtures::categories(&[("drama", "Drama"), ("anime", "Anime")]))
        .with_videos(vec![
            fixtures::video("v1", "Night Train", "drama"),
            fixtures::video("v2", "Paper Moon", "anime"),
        ])
        .with_episodes(
            "v1",
            vec![
                fixtures::video_episode("v1", 1),
                fixtures::video_episode("v1", 2),
            ],
        )
        .with_stream("v1_1_1", "https://cdn.example/v1/1.m3u8")
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.defaults.comic = MOCK_SOURCE.to_string();
        config.defaults.ebook = MOCK_SOURCE.to_string();
        config.defaults.podcast = MOCK_SOURCE.to_string();
        config.defaults.video = MOCK_SOURCE.to_string();
        config.cache = CacheConfig {
            enabled: !test_config.disable_cache,
            ..Default::default()
        };
        config.transcoder = TranscoderConfig {
            ffmpeg_path: test_config
                .ffmpeg_path
                .unwrap_or_else(|| temp_dir.path().join("missing-ffmpeg")),
            output_dir: temp_dir.path().join("output"),
            timeout_secs: 30,
            cleanup_grace_ms: 1000,
        };
        config.warmup = WarmupConfig {
            max_pages_per_category: 5,
            page_size: 2,
        };

        let comics = Arc::new(comic_source());
        let ebooks = Arc::new(ebook_source());
        let podcasts = Arc::new(podcast_source());
        let videos = Arc::new(video_source());

        let mut sources = SourceFactories::empty(&config);
        sources.comics.register_instance(
            meta(MOCK_SOURCE, Domain::Comic, true),
            Arc::clone(&comics) as Arc<dyn ComicSource>,
        );
        sources.comics.register_instance(
            meta(DISABLED_SOURCE, Domain::Comic, false),
            Arc::new(MockComicSource::new(DISABLED_SOURCE)) as Arc<dyn ComicSource>,
        );
        sources.ebooks.register_instance(
            meta(MOCK_SOURCE, Domain::Ebook, true),
            Arc::clone(&ebooks) as Arc<dyn EbookSource>,
        );
        sources.podcasts.register_instance(
            meta(MOCK_SOURCE, Domain::Podcast, true),
            Arc::clone(&podcasts) as Arc<dyn PodcastSource>,
        );
        sources.videos.register_instance(
            meta(MOCK_SOURCE, Domain::Video, true),
            Arc::clone(&videos) as Arc<dyn VideoSource>,
        );

        let proxy = MediaProxy::from_config(&config).expect("Failed to build media proxy");
        let state = Arc::new(AppState::new(config, sources, proxy));
        let router = mediahub_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            comics,
            ebooks,
            podcasts,
            videos,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a GET request and keep the raw body and headers.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        RawResponse {
            status,
            headers,
            body,
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
