use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use super::sources::builtin_sources;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub warmup: WarmupConfig,
    #[serde(default)]
    pub defaults: DefaultSources,
    /// Upstream sources. When omitted, the built-in registry is used.
    #[serde(default = "builtin_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            transcoder: TranscoderConfig::default(),
            extractor: ExtractorConfig::default(),
            warmup: WarmupConfig::default(),
            defaults: DefaultSources::default(),
            sources: builtin_sources(),
        }
    }
}

impl Config {
    /// Looks up a source row by id.
    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Outbound request policy shared by every adapter session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Lower bound of the random pause before each upstream call.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Upper bound of the random pause before each upstream call.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
    #[serde(default = "default_extractor_timeout")]
    pub extractor_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            page_timeout_secs: default_page_timeout(),
            api_timeout_secs: default_api_timeout(),
            stream_timeout_secs: default_stream_timeout(),
            extractor_timeout_secs: default_extractor_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    /// A policy without pacing, used by tests and local fixtures.
    pub fn without_delay() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..Self::default()
        }
    }
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    1500
}

fn default_page_timeout() -> u64 {
    10
}

fn default_api_timeout() -> u64 {
    15
}

fn default_stream_timeout() -> u64 {
    30
}

fn default_extractor_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_list_ttl")]
    pub list_ttl_secs: u64,
    #[serde(default = "default_detail_ttl")]
    pub detail_ttl_secs: u64,
    #[serde(default = "default_content_ttl")]
    pub content_ttl_secs: u64,
    #[serde(default = "default_hot_ttl")]
    pub hot_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            list_ttl_secs: default_list_ttl(),
            detail_ttl_secs: default_detail_ttl(),
            content_ttl_secs: default_content_ttl(),
            hot_ttl_secs: default_hot_ttl(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_list_ttl() -> u64 {
    300
}

fn default_detail_ttl() -> u64 {
    600
}

fn default_content_ttl() -> u64 {
    1800
}

fn default_hot_ttl() -> u64 {
    3600
}

/// HLS to MP4 transcoder configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscoderConfig {
    /// Path to the ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// Directory receiving `<series>/<episode>.mp4` outputs.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Hard limit for a single transcode in seconds.
    #[serde(default = "default_transcode_timeout")]
    pub timeout_secs: u64,
    /// Delay between a finished download and deletion of the file.
    #[serde(default = "default_cleanup_grace_ms")]
    pub cleanup_grace_ms: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            output_dir: default_output_dir(),
            timeout_secs: default_transcode_timeout(),
            cleanup_grace_ms: default_cleanup_grace_ms(),
        }
    }
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("mediahub-transcode")
}

fn default_transcode_timeout() -> u64 {
    7200
}

fn default_cleanup_grace_ms() -> u64 {
    2000
}

/// External extractor (yt-dlp) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_extractor_binary")]
    pub binary: PathBuf,
    /// Netscape cookie file handed to the extractor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies_file: Option<PathBuf>,
    /// Path to a node-compatible runtime for signature solving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_runtime: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary: default_extractor_binary(),
            cookies_file: None,
            js_runtime: None,
        }
    }
}

fn default_extractor_binary() -> PathBuf {
    PathBuf::from("yt-dlp")
}

/// Metadata warm-up configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WarmupConfig {
    #[serde(default = "default_max_pages")]
    pub max_pages_per_category: u32,
    #[serde(default = "default_warmup_page_size")]
    pub page_size: u32,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            max_pages_per_category: default_max_pages(),
            page_size: default_warmup_page_size(),
        }
    }
}

fn default_max_pages() -> u32 {
    50
}

fn default_warmup_page_size() -> u32 {
    50
}

/// Source used when a request carries no `source` parameter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefaultSources {
    #[serde(default = "default_comic")]
    pub comic: String,
    #[serde(default = "default_ebook")]
    pub ebook: String,
    #[serde(default = "default_podcast")]
    pub podcast: String,
    #[serde(default = "default_video")]
    pub video: String,
}

impl Default for DefaultSources {
    fn default() -> Self {
        Self {
            comic: default_comic(),
            ebook: default_ebook(),
            podcast: default_podcast(),
            video: default_video(),
        }
    }
}

impl DefaultSources {
    pub fn for_domain(&self, domain: Domain) -> &str {
        match domain {
            Domain::Comic => &self.comic,
            Domain::Ebook => &self.ebook,
            Domain::Podcast => &self.podcast,
            Domain::Video => &self.video,
        }
    }
}

fn default_comic() -> String {
    "dm5".to_string()
}

fn default_ebook() -> String {
    "biquge".to_string()
}

fn default_podcast() -> String {
    "tingshu".to_string()
}

fn default_video() -> String {
    "maccms".to_string()
}

/// Content domain served by a source.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Comic,
    Ebook,
    Podcast,
    Video,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Comic => "comic",
            Domain::Ebook => "ebook",
            Domain::Podcast => "podcast",
            Domain::Video => "video",
        }
    }
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comic" | "comics" => Ok(Domain::Comic),
            "ebook" | "ebooks" => Ok(Domain::Ebook),
            "podcast" | "podcasts" => Ok(Domain::Podcast),
            "video" | "videos" => Ok(Domain::Video),
            other => Err(format!("unknown domain: {}", other)),
        }
    }
}

/// One upstream site.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_url: String,
    pub domain: Domain,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<UpstreamProxy>,
    #[serde(default)]
    pub download: DownloadConfig,
    /// Adapter-specific settings (parser URLs, channel lists, API hosts).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl SourceConfig {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Upstream HTTP proxy for a source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamProxy {
    pub host: String,
    pub port: u16,
    #[serde(rename = "type", default)]
    pub kind: ProxyKind,
}

impl UpstreamProxy {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.kind.scheme(), self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProxyKind {
    #[default]
    Http,
    Https,
    Socks5,
}

impl ProxyKind {
    fn scheme(&self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
            ProxyKind::Socks5 => "socks5h",
        }
    }
}

/// Headers used when re-serving binary assets of a source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DownloadConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Page visited once to collect cookies before fetching assets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Public view of a source row.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSource {
    pub id: String,
    pub name: String,
    pub domain: Domain,
    pub enabled: bool,
    pub proxy_configured: bool,
}

/// Sanitized config for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub defaults: DefaultSources,
    pub sources: Vec<SanitizedSource>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            cache: config.cache.clone(),
            defaults: config.defaults.clone(),
            sources: config
                .sources
                .iter()
                .map(|s| SanitizedSource {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    domain: s.domain,
                    enabled: s.enabled,
                    proxy_configured: s.proxy.is_some(),
                })
                .collect(),
        }
    }
}
