//! Image and video proxying.
//!
//! Upstream media usually refuses requests without the site's Referer or
//! cookies. [`MediaProxy`] keeps one session per source carrying the source's
//! `download` settings and hands the bytes (or an open response) to the HTTP
//! layer.

mod media;
mod playlist;

pub use media::{MediaProxy, ProxiedImage, ProxiedVideo, CHUNK_SIZE, FORWARDED_HEADERS};
pub use playlist::{is_playlist, rewrite_playlist, HLS_CONTENT_TYPE};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("only http and https targets can be proxied")]
    BadTarget,

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("upstream request failed for {0}")]
    Upstream(String),
}

/// Parse a proxy target, accepting only `http`/`https`.
pub fn validate_target(target: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(target.trim()).map_err(|_| ProxyError::BadTarget)?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(ProxyError::BadTarget),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target() {
        assert!(validate_target("https://img.example/a.jpg").is_ok());
        assert!(validate_target(" http://img.example/a.jpg ").is_ok());
        assert!(matches!(
            validate_target("file:///etc/passwd"),
            Err(ProxyError::BadTarget)
        ));
        assert!(validate_target("ftp://x.example/a").is_err());
        assert!(validate_target("not a url").is_err());
    }
}
