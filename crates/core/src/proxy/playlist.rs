//! HLS playlist handling.

use url::Url;

pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Whether a target is an HLS playlist, by extension or content type.
pub fn is_playlist(url: &Url, content_type: Option<&str>) -> bool {
    url.path().to_ascii_lowercase().ends_with(".m3u8")
        || content_type
            .map(|ct| ct.to_ascii_lowercase().contains("mpegurl"))
            .unwrap_or(false)
}

fn absolutize(base: &Url, uri: &str) -> String {
    base.join(uri.trim())
        .map(String::from)
        .unwrap_or_else(|_| uri.to_string())
}

/// Rewrite every relative URI of a playlist against its own URL.
///
/// Covers segment and variant lines plus `URI="…"` attributes of tag lines
/// (keys, maps, alternative renditions).
pub fn rewrite_playlist(body: &str, playlist_url: &Url) -> String {
    let mut out = String::with_capacity(body.len() + 256);
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.push_str(line);
        } else if trimmed.starts_with('#') {
            out.push_str(&rewrite_uri_attribute(line, playlist_url));
        } else {
            out.push_str(&absolutize(playlist_url, trimmed));
        }
        out.push('\n');
    }
    out
}

fn rewrite_uri_attribute(line: &str, base: &Url) -> String {
    const ATTR: &str = "URI=\"";
    let Some(start) = line.find(ATTR).map(|i| i + ATTR.len()) else {
        return line.to_string();
    };
    let Some(len) = line[start..].find('"') else {
        return line.to_string();
    };
    let uri = &line[start..start + len];
    format!(
        "{}{}{}",
        &line[..start],
        absolutize(base, uri),
        &line[start + len..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDIA: &str = include_str!("../../tests/fixtures/media_playlist.m3u8");

    #[test]
    fn test_rewrite_media_playlist() {
        let base = Url::parse("https://cdn.example/hls/720p/index.m3u8").unwrap();
        let rewritten = rewrite_playlist(MEDIA, &base);
        let lines: Vec<&str> = rewritten.lines().collect();

        assert_eq!(lines[0], "#EXTM3U");
        assert!(rewritten.contains(
            r#"#EXT-X-KEY:METHOD=AES-128,URI="https://cdn.example/hls/720p/key.bin",IV=0x1"#
        ));
        assert!(rewritten.contains("\nhttps://cdn.example/hls/720p/seg-000.ts\n"));
        assert!(rewritten.contains("\nhttps://cdn.example/hls/shared/seg-001.ts\n"));
        assert!(rewritten.contains("\nhttps://other.example/seg-002.ts\n"));
        assert!(rewritten.contains("\nhttps://cdn.example/abs/seg-003.ts\n"));
        assert!(rewritten.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_is_playlist() {
        let m3u8 = Url::parse("https://cdn.example/a/INDEX.M3U8?t=1").unwrap();
        let mp4 = Url::parse("https://cdn.example/a/v.mp4").unwrap();
        assert!(is_playlist(&m3u8, None));
        assert!(!is_playlist(&mp4, Some("video/mp4")));
        assert!(is_playlist(&mp4, Some("application/x-mpegURL")));
    }
}
