use bytes::Bytes;
use rand::Rng;
use reqwest::cookie::Jar;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT,
};
use reqwest::{Client, Proxy, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::{FetchConfig, SourceConfig};
use crate::metrics::{UPSTREAM_DURATION, UPSTREAM_REQUESTS};

use super::charset::decode_body;

const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Errors raised while building a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid base URL '{0}'")]
    BaseUrl(String),

    #[error("invalid upstream proxy: {0}")]
    Proxy(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Timeout class of an upstream call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutClass {
    #[default]
    Page,
    Api,
    Stream,
    Extractor,
}

impl TimeoutClass {
    pub fn duration(&self, config: &FetchConfig) -> Duration {
        let secs = match self {
            TimeoutClass::Page => config.page_timeout_secs,
            TimeoutClass::Api => config.api_timeout_secs,
            TimeoutClass::Stream => config.stream_timeout_secs,
            TimeoutClass::Extractor => config.extractor_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub referer: Option<String>,
    pub timeout: TimeoutClass,
    pub verify_ssl: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            headers: Vec::new(),
            referer: None,
            timeout: TimeoutClass::Page,
            verify_ssl: true,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a site-internal JSON API.
    pub fn api() -> Self {
        Self::default().timeout(TimeoutClass::Api)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn timeout(mut self, timeout: TimeoutClass) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn insecure(mut self) -> Self {
        self.verify_ssl = false;
        self
    }
}

/// A successful, decoded upstream response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl FetchResponse {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        match serde_json::from_str(&self.text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(url = %self.url, error = %e, "Upstream returned malformed JSON");
                None
            }
        }
    }
}

/// HTTP session of one source.
///
/// Safe to share across requests: the only mutable state is the cookie jar,
/// which both clients share.
#[derive(Clone)]
pub struct FetchSession {
    source_id: String,
    base_url: Url,
    client: Client,
    insecure_client: Client,
    jar: Arc<Jar>,
    policy: FetchConfig,
}

impl std::fmt::Debug for FetchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchSession")
            .field("source_id", &self.source_id)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl FetchSession {
    /// Build the session for a source row.
    pub fn new(source: &SourceConfig, policy: &FetchConfig) -> Result<Self, SessionError> {
        let base_url = Url::parse(&source.base_url)
            .map_err(|_| SessionError::BaseUrl(source.base_url.clone()))?;
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
        );
        if let Ok(referer) = HeaderValue::from_str(base_url.as_str()) {
            headers.insert(REFERER, referer);
        }
        if let Ok(agent) = HeaderValue::from_str(&policy.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let proxy = source
            .proxy
            .as_ref()
            .map(|p| Proxy::all(p.url()).map_err(|e| SessionError::Proxy(e.to_string())))
            .transpose()?;

        let build = |insecure: bool| {
            let mut builder = Client::builder()
                .default_headers(headers.clone())
                .cookie_provider(Arc::clone(&jar))
                .gzip(true)
                .brotli(true)
                .connect_timeout(Duration::from_secs(policy.page_timeout_secs))
                .danger_accept_invalid_certs(insecure);
            if let Some(proxy) = proxy.clone() {
                builder = builder.proxy(proxy);
            }
            builder
                .build()
                .map_err(|e| SessionError::Client(e.to_string()))
        };

        Ok(Self {
            source_id: source.id.clone(),
            base_url,
            client: build(false)?,
            insecure_client: build(true)?,
            jar,
            policy: policy.clone(),
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a possibly relative link against the source base URL.
    pub fn absolute(&self, link: &str) -> Option<String> {
        self.base_url.join(link.trim()).ok().map(String::from)
    }

    /// Cookie header currently stored for a URL.
    pub fn cookies_for(&self, url: &str) -> Option<String> {
        use reqwest::cookie::CookieStore;
        let url = Url::parse(url).ok()?;
        self.jar
            .cookies(&url)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    pub async fn get(&self, url: &str) -> Option<FetchResponse> {
        self.get_with(url, &RequestOptions::default()).await
    }

    pub async fn get_with(&self, url: &str, options: &RequestOptions) -> Option<FetchResponse> {
        let request = self.client_for(options).get(url);
        let response = self.send(url, request, options).await?;
        into_fetch_response(response).await
    }

    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        options: &RequestOptions,
    ) -> Option<FetchResponse> {
        let request = self.client_for(options).post(url).form(form);
        let response = self.send(url, request, options).await?;
        into_fetch_response(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Option<T> {
        self.get_with(url, options).await?.json()
    }

    pub async fn get_bytes(&self, url: &str, options: &RequestOptions) -> Option<(HeaderMap, Bytes)> {
        let request = self.client_for(options).get(url);
        let response = self.send(url, request, options).await?;
        let headers = response.headers().clone();
        match response.bytes().await {
            Ok(body) => Some((headers, body)),
            Err(e) => {
                warn!(source = %self.source_id, url, error = %e, "Failed to read upstream body");
                None
            }
        }
    }

    /// Send a request and return the raw response, leaving the body unread.
    ///
    /// Used by the stream proxy, which forwards the body as it arrives.
    pub async fn open(&self, url: &str, options: &RequestOptions) -> Option<Response> {
        let request = self.client_for(options).get(url);
        self.send(url, request, options).await
    }

    fn client_for(&self, options: &RequestOptions) -> &Client {
        if options.verify_ssl {
            &self.client
        } else {
            &self.insecure_client
        }
    }

    async fn pace(&self) {
        let (min, max) = (self.policy.min_delay_ms, self.policy.max_delay_ms);
        if max == 0 {
            return;
        }
        let delay = rand::thread_rng().gen_range(min.min(max)..=max);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    async fn send(
        &self,
        url: &str,
        mut request: RequestBuilder,
        options: &RequestOptions,
    ) -> Option<Response> {
        self.pace().await;

        // Streams only bound the wait for response headers; bodies may run long.
        let limit = options.timeout.duration(&self.policy);
        if options.timeout != TimeoutClass::Stream {
            request = request.timeout(limit);
        }
        if !options.params.is_empty() {
            request = request.query(&options.params);
        }
        if let Some(referer) = &options.referer {
            request = request.header(REFERER, referer);
        }
        for (name, value) in &options.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!(source = %self.source_id, header = %name, "Skipping invalid header"),
            }
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(limit, request.send()).await {
            Ok(result) => result,
            Err(_) => {
                UPSTREAM_REQUESTS
                    .with_label_values(&[&self.source_id, "transport"])
                    .inc();
                warn!(source = %self.source_id, url, timeout_secs = limit.as_secs(), "Upstream request timed out");
                return None;
            }
        };
        UPSTREAM_DURATION
            .with_label_values(&[&self.source_id])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(response) if response.status().is_success() => {
                UPSTREAM_REQUESTS
                    .with_label_values(&[&self.source_id, "ok"])
                    .inc();
                debug!(source = %self.source_id, url, status = %response.status(), "Upstream request");
                Some(response)
            }
            Ok(response) => {
                UPSTREAM_REQUESTS
                    .with_label_values(&[&self.source_id, "status"])
                    .inc();
                warn!(source = %self.source_id, url, status = %response.status(), "Upstream returned error status");
                None
            }
            Err(e) => {
                UPSTREAM_REQUESTS
                    .with_label_values(&[&self.source_id, "transport"])
                    .inc();
                warn!(source = %self.source_id, url, error = %e, timeout = e.is_timeout(), "Upstream request failed");
                None
            }
        }
    }
}

async fn into_fetch_response(response: Response) -> Option<FetchResponse> {
    let url = response.url().clone();
    let status = response.status();
    let headers = response.headers().clone();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            warn!(url = %url, error = %e, "Failed to read upstream body");
            return None;
        }
    };
    let text = decode_body(&headers, body).await;
    Some(FetchResponse {
        url,
        status,
        headers,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Domain;
    use crate::testing::upstream::{serve, source_row};
    use axum::http::HeaderMap as AxumHeaders;
    use axum::routing::{get, post};
    use axum::{Form, Router};
    use std::collections::HashMap;

    fn test_router() -> Router {
        Router::new()
            .route("/ok", get(|| async { "hello" }))
            .route(
                "/missing",
                get(|| async { (axum::http::StatusCode::NOT_FOUND, "gone") }),
            )
            .route(
                "/echo-referer",
                get(|headers: AxumHeaders| async move {
                    headers
                        .get("referer")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string()
                }),
            )
            .route(
                "/json",
                get(|axum::extract::Query(q): axum::extract::Query<HashMap<String, String>>| async move {
                    axum::Json(q)
                }),
            )
            .route(
                "/form",
                post(|Form(f): Form<HashMap<String, String>>| async move {
                    f.get("name").cloned().unwrap_or_default()
                }),
            )
            .route(
                "/set-cookie",
                get(|| async { ([("set-cookie", "sid=abc; Path=/")], "ok") }),
            )
    }

    async fn session() -> FetchSession {
        let base = serve(test_router()).await;
        FetchSession::new(
            &source_row("fixture", Domain::Comic, &base),
            &FetchConfig::without_delay(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_success() {
        let session = session().await;
        let url = session.absolute("/ok").unwrap();
        let response = session.get(&url).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text(), "hello");
    }

    #[tokio::test]
    async fn test_non_2xx_is_none() {
        let session = session().await;
        let url = session.absolute("/missing").unwrap();
        assert!(session.get(&url).await.is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_is_none() {
        let source = source_row("dead", Domain::Comic, "http://127.0.0.1:9");
        let session = FetchSession::new(&source, &FetchConfig::without_delay()).unwrap();
        assert!(session.get("http://127.0.0.1:9/").await.is_none());
    }

    #[tokio::test]
    async fn test_default_referer_is_base_url() {
        let session = session().await;
        let url = session.absolute("/echo-referer").unwrap();
        let response = session.get(&url).await.unwrap();
        assert_eq!(response.text(), session.base_url().as_str());

        let options = RequestOptions::new().referer("https://other.example/page");
        let response = session.get_with(&url, &options).await.unwrap();
        assert_eq!(response.text(), "https://other.example/page");
    }

    #[tokio::test]
    async fn test_get_json_with_params() {
        let session = session().await;
        let url = session.absolute("/json").unwrap();
        let options = RequestOptions::api().query("page", 2).query("q", "a b");
        let body: HashMap<String, String> = session.get_json(&url, &options).await.unwrap();
        assert_eq!(body.get("page").map(String::as_str), Some("2"));
        assert_eq!(body.get("q").map(String::as_str), Some("a b"));
    }

    #[tokio::test]
    async fn test_post_form() {
        let session = session().await;
        let url = session.absolute("/form").unwrap();
        let response = session
            .post_form(&url, &[("name", "value")], &RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.text(), "value");
    }

    #[tokio::test]
    async fn test_cookie_jar_shared() {
        let session = session().await;
        let url = session.absolute("/set-cookie").unwrap();
        session.get(&url).await.unwrap();
        let cookies = session.cookies_for(&url).unwrap();
        assert!(cookies.contains("sid=abc"));
    }

    #[test]
    fn test_timeout_classes() {
        let config = FetchConfig::default();
        assert_eq!(TimeoutClass::Page.duration(&config), Duration::from_secs(10));
        assert_eq!(TimeoutClass::Api.duration(&config), Duration::from_secs(15));
        assert_eq!(TimeoutClass::Stream.duration(&config), Duration::from_secs(30));
        assert_eq!(
            TimeoutClass::Extractor.duration(&config),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_bad_base_url() {
        let source = source_row("bad", Domain::Comic, "not a url");
        assert!(matches!(
            FetchSession::new(&source, &FetchConfig::default()),
            Err(SessionError::BaseUrl(_))
        ));
    }
}
