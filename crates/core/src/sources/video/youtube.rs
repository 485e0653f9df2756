//! YouTube channels through `yt-dlp`.
//!
//! Categories are the channels named in the `channels` option
//! (`id:handle,…`). Every video is a single-episode series on line `1`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{ExtractorConfig, FetchConfig, SourceConfig};
use crate::content::{
    join_id, split_id, Category, Listing, Paging, Video, VideoEpisode, VideoEpisodeDetail,
};
use crate::extractor::{ExtractedEntry, ExtractorError, YtDlp};
use crate::fetch::SessionError;
use crate::sources::error::SourceError;
use crate::sources::traits::VideoSource;
use crate::sources::util::{checked_slug, parse_pairs};

const LINE: &str = "1";
const EPISODE: &str = "1";

fn into_video(entry: ExtractedEntry) -> Video {
    let cover = entry.best_thumbnail().unwrap_or_default();
    let author = entry.author();
    Video {
        cover,
        rating: None,
        year: entry
            .upload_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .map(str::to_string),
        area: None,
        status: None,
        episodes: Some(1),
        actors: author.into_iter().collect(),
        tags: entry.tags,
        description: entry.description.filter(|d| !d.is_empty()),
        id: entry.id,
        title: entry.title,
    }
}

pub struct YouTube {
    source_id: String,
    base_url: String,
    extractor: YtDlp,
    categories: Vec<Category>,
    channels: HashMap<String, String>,
}

impl YouTube {
    pub fn new(
        source: &SourceConfig,
        policy: &FetchConfig,
        extractor: &ExtractorConfig,
    ) -> Result<Self, SessionError> {
        url::Url::parse(&source.base_url)
            .map_err(|_| SessionError::BaseUrl(source.base_url.clone()))?;
        let categories = parse_pairs(source.option("channels").unwrap_or_default());
        let channels = categories
            .iter()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();
        Ok(Self {
            source_id: source.id.clone(),
            base_url: source.base_url.trim_end_matches('/').to_string(),
            extractor: YtDlp::new(extractor, Duration::from_secs(policy.extractor_timeout_secs)),
            categories,
            channels,
        })
    }

    fn channel_url(&self, handle: &str) -> String {
        if handle.starts_with("http://") || handle.starts_with("https://") {
            handle.to_string()
        } else if handle.starts_with("PL") {
            format!("{}/playlist?list={}", self.base_url, handle)
        } else {
            format!("{}/{}/videos", self.base_url, handle.trim_start_matches('/'))
        }
    }

    fn watch_url(&self, video_id: &str) -> String {
        format!("{}/watch?v={}", self.base_url, video_id)
    }

    fn listing(
        &self,
        result: Result<Vec<ExtractedEntry>, ExtractorError>,
        paging: Paging,
    ) -> Listing<Video> {
        match result {
            Ok(entries) => {
                Listing::from_scroll(entries.into_iter().map(into_video).collect(), paging)
            }
            Err(e) => {
                warn!(source = %self.source_id, error = %e, "Extractor listing failed");
                Listing::empty(paging)
            }
        }
    }

    fn episode(&self, video: &Video) -> VideoEpisode {
        VideoEpisode {
            id: join_id(&[&video.id, LINE, EPISODE]),
            series_id: video.id.clone(),
            line_id: LINE.to_string(),
            title: video.title.clone(),
            episode: 1,
            play_url: self.watch_url(&video.id),
        }
    }
}

#[async_trait]
impl VideoSource for YouTube {
    fn id(&self) -> &str {
        &self.source_id
    }

    async fn categories(&self) -> Vec<Category> {
        self.categories.clone()
    }

    async fn videos(&self, category: &str, paging: Paging) -> Listing<Video> {
        let Some(handle) = self.channels.get(category) else {
            return Listing::empty(paging);
        };
        let result = self.extractor.list(&self.channel_url(handle), paging).await;
        self.listing(result, paging)
    }

    async fn detail(&self, video_id: &str) -> Result<Video, SourceError> {
        let video_id = checked_slug(video_id)?;
        let entry = self.extractor.detail(&self.watch_url(video_id)).await?;
        if entry.id.is_empty() {
            return Err(SourceError::NotFound(video_id.to_string()));
        }
        Ok(into_video(entry))
    }

    async fn episodes(&self, video_id: &str) -> Result<Vec<VideoEpisode>, SourceError> {
        let video = self.detail(video_id).await?;
        Ok(vec![self.episode(&video)])
    }

    async fn episode_detail(&self, episode_id: &str) -> Result<VideoEpisodeDetail, SourceError> {
        let parts = split_id(episode_id, 3).ok_or_else(|| SourceError::bad_id(episode_id))?;
        if parts[1] != LINE || parts[2] != EPISODE {
            return Err(SourceError::bad_id(episode_id));
        }
        let video_id = checked_slug(parts[0])?;
        let watch_url = self.watch_url(video_id);

        let (video, stream) = tokio::try_join!(
            async { self.detail(video_id).await },
            async {
                self.extractor
                    .stream_url(&watch_url)
                    .await
                    .map_err(SourceError::from)
            },
        )?;
        Ok(VideoEpisodeDetail::resolved(self.episode(&video), stream))
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Video> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Listing::empty(paging);
        }
        let result = self.extractor.search(keyword, paging).await;
        self.listing(result, paging)
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::config::Domain;
    use crate::content::StreamFormat;
    use crate::extractor::parse_json_lines;
    use crate::testing::upstream::{fixture, source_row};

    fn youtube(binary: &Path) -> YouTube {
        let mut source = source_row("youtube", Domain::Video, "https://www.youtube.com");
        source
            .options
            .insert("channels".into(), "news:@NewsChannel,talks:PLtalks123".into());
        YouTube::new(
            &source,
            &FetchConfig::without_delay(),
            &ExtractorConfig {
                binary: binary.to_path_buf(),
                cookies_file: None,
                js_runtime: None,
            },
        )
        .unwrap()
    }

    /// A stand-in extractor answering listing, detail and URL calls.
    #[cfg(unix)]
    fn fake_extractor(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let listing = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/ytdlp_flat_playlist.jsonl");
        let script = dir.join("yt-dlp");
        let body = format!(
            r#"#!/bin/sh
case "$*" in
  *--flat-playlist*) cat '{}' ;;
  *--dump-single-json*) echo '{{"id":"dQw4w9WgXcQ","title":"Morning bulletin","upload_date":"20240105","channel":"News Channel","tags":["news"]}}' ;;
  *" -g "*) echo 'https://rr1.googlevideo.example/videoplayback?id=dQw4w9WgXcQ' ;;
  *) exit 2 ;;
esac
"#,
            listing.display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[test]
    fn test_into_video() {
        let entries = parse_json_lines(&fixture("ytdlp_flat_playlist.jsonl"));
        let video = into_video(entries[0].clone());
        assert_eq!(video.id, "dQw4w9WgXcQ");
        assert_eq!(video.cover, "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg");
        assert_eq!(video.actors, vec!["News Channel"]);
        assert_eq!(video.episodes, Some(1));
        assert!(video.description.is_none());
    }

    #[test]
    fn test_channel_urls() {
        let yt = youtube(Path::new("yt-dlp"));
        assert_eq!(
            yt.channel_url("@NewsChannel"),
            "https://www.youtube.com/@NewsChannel/videos"
        );
        assert_eq!(
            yt.channel_url("PLtalks123"),
            "https://www.youtube.com/playlist?list=PLtalks123"
        );
        assert_eq!(yt.categories.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let yt = youtube(Path::new("/nonexistent/yt-dlp"));
        assert!(yt.videos("news", Paging::default()).await.items.is_empty());
        let err = yt.detail("dQw4w9WgXcQ").await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::Tool(ExtractorError::ToolMissing { .. })
        ));
        assert!(matches!(
            yt.detail("../etc").await,
            Err(SourceError::BadId(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listing_and_playback_through_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let yt = youtube(&fake_extractor(dir.path()));

        let listing = yt.videos("news", Paging::default()).await;
        assert_eq!(listing.items.len(), 3);
        assert!(!listing.has_more);
        assert!(yt.videos("unknown", Paging::default()).await.items.is_empty());

        let episodes = yt.episodes("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].id, "dQw4w9WgXcQ_1_1");

        let detail = yt.episode_detail("dQw4w9WgXcQ_1_1").await.unwrap();
        assert_eq!(
            detail.video_url.as_deref(),
            Some("https://rr1.googlevideo.example/videoplayback?id=dQw4w9WgXcQ")
        );
        assert_eq!(detail.format, StreamFormat::Unknown);
        assert_eq!(detail.episode.title, "Morning bulletin");
        assert!(matches!(
            yt.episode_detail("dQw4w9WgXcQ_1_2").await,
            Err(SourceError::BadId(_))
        ));
    }
}
