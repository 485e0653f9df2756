use bytes::Bytes;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::header::{HeaderMap, CONTENT_TYPE};

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_\-]+)"#).unwrap()
});

/// Bytes scanned for a `<meta>` charset declaration.
const SNIFF_WINDOW: usize = 4096;

/// Charset named by the `Content-Type` header, lowercased.
pub(crate) fn advertised_charset(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

fn is_latin1(label: &str) -> bool {
    matches!(label, "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1")
}

/// Charset declared by the document itself.
pub(crate) fn sniff_meta_charset(body: &[u8]) -> Option<String> {
    let head = String::from_utf8_lossy(&body[..body.len().min(SNIFF_WINDOW)]);
    META_CHARSET
        .captures(&head)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Charset used to decode a body.
///
/// The advertised charset wins unless it is missing or Latin-1, which many
/// servers send by default; the document's own declaration is used then,
/// falling back to UTF-8.
pub(crate) fn effective_charset(headers: &HeaderMap, body: &[u8]) -> String {
    match advertised_charset(headers) {
        Some(label) if !is_latin1(&label) => label,
        _ => sniff_meta_charset(body).unwrap_or_else(|| "utf-8".to_string()),
    }
}

/// Decode a response body to text.
pub async fn decode_body(headers: &HeaderMap, body: Bytes) -> String {
    let charset = effective_charset(headers, &body);
    if charset == "utf-8" || charset == "utf8" {
        return String::from_utf8_lossy(&body).into_owned();
    }

    let lossy = String::from_utf8_lossy(&body).into_owned();
    let relabelled = http::Response::builder()
        .header(CONTENT_TYPE, format!("text/html; charset={}", charset))
        .body(body);
    match relabelled {
        Ok(response) => reqwest::Response::from(response)
            .text()
            .await
            .unwrap_or(lossy),
        Err(_) => lossy,
    }
}
