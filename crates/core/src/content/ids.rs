//! Opaque id codecs.
//!
//! Chapter and episode ids carry enough information to reach the upstream
//! resource without re-crawling the parent. Two encodings are used: compound
//! ids joined by `_`, and Base64url-wrapped absolute URLs.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

const SEPARATOR: char = '_';

/// Wrap an absolute URL into a path-safe id.
pub fn encode_url_id(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

/// Unwrap an id produced by [`encode_url_id`]. Padding is optional.
pub fn decode_url_id(id: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(id.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(id))
        .ok()?;
    let url = String::from_utf8(bytes).ok()?;
    if url.starts_with("http://") || url.starts_with("https://") {
        Some(url)
    } else {
        None
    }
}

/// Join id parts with `_`.
pub fn join_id(parts: &[&str]) -> String {
    parts.join(&SEPARATOR.to_string())
}

/// Split a compound id into exactly `parts` non-empty parts.
///
/// Splitting starts from the right so only the leading part may itself
/// contain `_`.
pub fn split_id(id: &str, parts: usize) -> Option<Vec<&str>> {
    if parts == 0 {
        return None;
    }
    let mut split: Vec<&str> = id.rsplitn(parts, SEPARATOR).collect();
    split.reverse();
    if split.len() == parts && split.iter().all(|p| !p.is_empty()) {
        Some(split)
    } else {
        None
    }
}

/// Leading run of ASCII digits, as used by numeric upstream ids.
pub fn numeric_prefix(s: &str) -> Option<u64> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
