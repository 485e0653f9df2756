//! Built-in source registry used when the config file lists no sources.

use std::collections::BTreeMap;

use super::types::{DownloadConfig, Domain, SourceConfig};

fn row(id: &str, name: &str, description: &str, base_url: &str, domain: Domain) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        base_url: base_url.to_string(),
        domain,
        enabled: true,
        proxy: None,
        download: DownloadConfig {
            referer: Some(format!("{}/", base_url.trim_end_matches('/'))),
            cookie_url: None,
            headers: BTreeMap::new(),
        },
        options: BTreeMap::new(),
    }
}

fn with_option(mut source: SourceConfig, key: &str, value: &str) -> SourceConfig {
    source.options.insert(key.to_string(), value.to_string());
    source
}

/// The shipped adapters with their stock settings.
pub fn builtin_sources() -> Vec<SourceConfig> {
    let mut dm5 = row(
        "dm5",
        "DM5",
        "Comic portal with signed per-page image scripts",
        "https://www.dm5.com",
        Domain::Comic,
    );
    dm5.download.cookie_url = Some("https://www.dm5.com/".to_string());

    let kuman = row(
        "kuman",
        "Kuman",
        "Single-page-per-image comic reader",
        "https://www.kumanwu.com",
        Domain::Comic,
    );

    let biquge = row(
        "biquge",
        "Biquge",
        "Web novel library",
        "https://www.biquge.co",
        Domain::Ebook,
    );

    let novelforum = with_option(
        row(
            "novelforum",
            "Novel Forum",
            "Serial fiction board",
            "https://www.novelforum.net",
            Domain::Ebook,
        ),
        "boards",
        "2:Fantasy,3:Romance,5:Martial Arts,8:Science Fiction",
    );

    let tingshu = row(
        "tingshu",
        "Tingshu",
        "Audiobook and radio drama catalogue",
        "https://www.tingshu7.com",
        Domain::Podcast,
    );

    let vodplus = with_option(
        row(
            "vodplus",
            "Vod Plus",
            "Premium series with signed play info",
            "https://www.vodplus.tv",
            Domain::Video,
        ),
        "api_base",
        "https://api.vodplus.tv",
    );

    let maccms = row(
        "maccms",
        "Mirror Cinema",
        "Mirror aggregator with external play lines",
        "https://www.mirrorcinema.cc",
        Domain::Video,
    );

    let mut youtube = with_option(
        row(
            "youtube",
            "YouTube",
            "Channel playlists through yt-dlp",
            "https://www.youtube.com",
            Domain::Video,
        ),
        "channels",
        "news:@BBCNews,science:@veritasium,tech:@mkbhd",
    );
    // Needs yt-dlp on the host.
    youtube.enabled = false;

    vec![dm5, kuman, biquge, novelforum, tingshu, vodplus, maccms, youtube]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_unique_and_referer_set() {
        let sources = builtin_sources();
        let mut ids: Vec<_> = sources.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), sources.len());
        for source in &sources {
            let referer = source.download.referer.as_deref().unwrap();
            assert!(referer.starts_with(&source.base_url));
        }
    }

    #[test]
    fn test_every_domain_covered() {
        let sources = builtin_sources();
        for domain in [Domain::Comic, Domain::Ebook, Domain::Podcast, Domain::Video] {
            assert!(sources.iter().any(|s| s.domain == domain && s.enabled));
        }
    }
}
