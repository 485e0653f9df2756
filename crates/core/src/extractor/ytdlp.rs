use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::content::Paging;

use super::ExtractorError;

/// One entry of a listing or a single-video dump.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractedEntry {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub webpage_url: Option<String>,
    pub thumbnail: Option<String>,
    pub thumbnails: Vec<Thumbnail>,
    pub description: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub upload_date: Option<String>,
    pub view_count: Option<u64>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thumbnail {
    pub url: String,
    pub width: Option<u32>,
}

impl ExtractedEntry {
    /// Largest thumbnail, falling back to `thumbnail`.
    pub fn best_thumbnail(&self) -> Option<String> {
        self.thumbnails
            .iter()
            .filter(|t| !t.url.is_empty())
            .max_by_key(|t| t.width.unwrap_or(0))
            .map(|t| t.url.clone())
            .or_else(|| self.thumbnail.clone())
    }

    pub fn author(&self) -> Option<String> {
        self.channel.clone().or_else(|| self.uploader.clone())
    }
}

/// Parse `--dump-json` output (one JSON object per line).
pub fn parse_json_lines(stdout: &str) -> Vec<ExtractedEntry> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<ExtractedEntry>(line) {
            Ok(entry) if !entry.id.is_empty() => Some(entry),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "Skipping unparsable yt-dlp line");
                None
            }
        })
        .collect()
}

/// Thin wrapper over the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    cookies_file: Option<PathBuf>,
    js_runtime: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(config: &ExtractorConfig, timeout: Duration) -> Self {
        Self {
            binary: config.binary.clone(),
            cookies_file: config.cookies_file.clone(),
            js_runtime: config.js_runtime.clone(),
            timeout,
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--ignore-config".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
        ];
        if let Some(cookies) = &self.cookies_file {
            args.extend(["--cookies".to_string(), cookies.display().to_string()]);
        }
        if let Some(runtime) = &self.js_runtime {
            args.extend([
                "--js-runtimes".to_string(),
                format!("node:{}", runtime.display()),
            ]);
        }
        args
    }

    fn playlist_args(&self, target: &str, paging: Paging) -> Vec<String> {
        let start = paging.offset() + 1;
        let end = paging.offset() + paging.limit as usize;
        let mut args = self.base_args();
        args.extend([
            "--flat-playlist".to_string(),
            "--dump-json".to_string(),
            "--playlist-start".to_string(),
            start.to_string(),
            "--playlist-end".to_string(),
            end.to_string(),
            target.to_string(),
        ]);
        args
    }

    /// One page of a playlist or channel tab.
    pub async fn list(&self, url: &str, paging: Paging) -> Result<Vec<ExtractedEntry>, ExtractorError> {
        let stdout = self.run(&self.playlist_args(url, paging)).await?;
        Ok(parse_json_lines(&stdout))
    }

    /// One page of search results.
    pub async fn search(
        &self,
        keyword: &str,
        paging: Paging,
    ) -> Result<Vec<ExtractedEntry>, ExtractorError> {
        let wanted = paging.offset() + paging.limit as usize;
        let target = format!("ytsearch{}:{}", wanted, keyword);
        self.list(&target, paging).await
    }

    /// Full metadata of a single video.
    pub async fn detail(&self, url: &str) -> Result<ExtractedEntry, ExtractorError> {
        let mut args = self.base_args();
        args.extend([
            "--no-playlist".to_string(),
            "--dump-single-json".to_string(),
            url.to_string(),
        ]);
        let stdout = self.run(&args).await?;
        serde_json::from_str::<ExtractedEntry>(stdout.trim())
            .map_err(|e| ExtractorError::Parse(e.to_string()))
    }

    /// Direct media URL of the best single-file format.
    pub async fn stream_url(&self, url: &str) -> Result<String, ExtractorError> {
        let mut args = self.base_args();
        args.extend([
            "--no-playlist".to_string(),
            "-f".to_string(),
            "best".to_string(),
            "-g".to_string(),
            url.to_string(),
        ]);
        let stdout = self.run(&args).await?;
        stdout
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with("http"))
            .map(str::to_string)
            .ok_or_else(|| ExtractorError::Parse("no URL printed".to_string()))
    }

    /// Raw JSON dump of an URL, for callers needing fields not modelled here.
    pub async fn dump(&self, url: &str) -> Result<Value, ExtractorError> {
        let mut args = self.base_args();
        args.extend(["--dump-single-json".to_string(), url.to_string()]);
        let stdout = self.run(&args).await?;
        serde_json::from_str(stdout.trim()).map_err(|e| ExtractorError::Parse(e.to_string()))
    }

    async fn run(&self, args: &[String]) -> Result<String, ExtractorError> {
        debug!(binary = %self.binary.display(), ?args, "Running extractor");
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ExtractorError::ToolMissing {
                        path: self.binary.clone(),
                    }
                }
                _ => ExtractorError::Io(e),
            })?;

        // Dropping the future on timeout kills the child.
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtractorError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(code = ?output.status.code(), %stderr, "Extractor failed");
            return Err(ExtractorError::Failed {
                code: output.status.code(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
