//! Media resolution pipeline.
//!
//! Turns an opaque chapter or episode id into something playable or
//! readable. Every stage returns `Result<T, ResolveError>`; the error names
//! the stage that failed so the façade can log it while answering with a
//! generic message.
//!
//! - [`packer`] / [`script`]: dense-packed script unpacking and evaluation
//! - [`cipher`]: ROT13 + Base64 + ROT13 audio URL chains
//! - [`vod`]: play-auth decoding and HMAC-SHA1 signed vod queries
//! - [`player`]: `player_aaaa` decoding and the AES parser step
//! - [`gather`]: bounded, cancellable per-page fetches
//! - [`literal`]: brace-balanced extraction of inline object literals

pub mod cipher;
pub mod gather;
pub mod literal;
pub mod packer;
pub mod player;
pub mod script;
pub mod vod;

use serde::Serialize;
use thiserror::Error;

use crate::metrics::RESOLVER_FAILURES;

/// Pipeline stage, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Packer,
    Script,
    Cipher,
    Sign,
    PlayAuth,
    Parser,
    Extractor,
    Gather,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Packer => "packer",
            Stage::Script => "script",
            Stage::Cipher => "cipher",
            Stage::Sign => "sign",
            Stage::PlayAuth => "play_auth",
            Stage::Parser => "parser",
            Stage::Extractor => "extractor",
            Stage::Gather => "gather",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolver stage failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} stage failed: {detail}")]
pub struct ResolveError {
    pub stage: Stage,
    pub detail: String,
}

impl ResolveError {
    pub fn new(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }

    pub fn fetch(detail: impl Into<String>) -> Self {
        Self::new(Stage::Fetch, detail)
    }

    /// Count the failure and log it with its stage.
    ///
    /// Called once at the boundary where the error leaves the resolver.
    pub fn record(&self, source: &str) {
        RESOLVER_FAILURES
            .with_label_values(&[self.stage.as_str()])
            .inc();
        tracing::warn!(source, stage = %self.stage, detail = %self.detail, "Media resolution failed");
    }
}

/// Convert an absent value into a stage failure.
pub trait OrStage<T> {
    fn or_stage(self, stage: Stage, detail: &str) -> Result<T, ResolveError>;
}

impl<T> OrStage<T> for Option<T> {
    fn or_stage(self, stage: Stage, detail: &str) -> Result<T, ResolveError> {
        self.ok_or_else(|| ResolveError::new(stage, detail))
    }
}

/// Whether a decoded value looks like a playable absolute URL.
pub fn looks_like_url(value: &str) -> bool {
    let value = value.trim();
    (value.starts_with("http://") || value.starts_with("https://") || value.starts_with("//"))
        && !value.contains(char::is_whitespace)
}

/// Whether a URL points at a direct HLS or MP4 stream.
pub fn is_direct_stream(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".mp4")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_stage() {
        let err = ResolveError::new(Stage::PlayAuth, "missing AccessKeyId");
        assert_eq!(err.to_string(), "play_auth stage failed: missing AccessKeyId");
    }

    #[test]
    fn test_or_stage() {
        let value: Option<u8> = None;
        let err = value.or_stage(Stage::Cipher, "no _conf").unwrap_err();
        assert_eq!(err.stage, Stage::Cipher);
        assert_eq!(Some(3).or_stage(Stage::Cipher, "x").unwrap(), 3);
    }

    #[test]
    fn test_record_counts_failure() {
        let before = RESOLVER_FAILURES.with_label_values(&["sign"]).get();
        ResolveError::new(Stage::Sign, "bad").record("vodplus");
        assert_eq!(
            RESOLVER_FAILURES.with_label_values(&["sign"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_url_shapes() {
        assert!(looks_like_url("https://cdn.example/a.m3u8"));
        assert!(looks_like_url("//cdn.example/a.mp4"));
        assert!(!looks_like_url("aHR0cHM6Ly9jZG4="));
        assert!(is_direct_stream("https://cdn.example/a/index.m3u8?token=1"));
        assert!(!is_direct_stream("https://cdn.example/share/abc"));
    }
}
