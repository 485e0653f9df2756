//! Vod Plus premium series.
//!
//! Listings come from a JSON API at the `api_base` option. Playback goes
//! through a per-episode `playAuth` exchanged for a signed vod query.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::config::{FetchConfig, SourceConfig};
use crate::content::html::absolute_url;
use crate::content::{
    join_id, normalize_order, split_id, Category, Listing, Paging, Video, VideoEpisode,
    VideoEpisodeDetail,
};
use crate::fetch::{FetchSession, RequestOptions, SessionError};
use crate::resolver::{vod, ResolveError, Stage};
use crate::sources::error::SourceError;
use crate::sources::traits::VideoSource;
use crate::sources::util::{checked_slug, parse_pairs};

const DEFAULT_CATEGORIES: &str = "1:剧集,2:电影,3:综艺,4:动漫";

/// The API exposes a single play line per series.
const LINE: &str = "1";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeriesPage {
    total: usize,
    list: Vec<SeriesRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SeriesRow {
    id: String,
    title: String,
    cover: String,
    score: Option<f32>,
    year: Option<String>,
    area: Option<String>,
    status: Option<String>,
    total_episodes: Option<u32>,
    actors: Vec<String>,
    tags: Vec<String>,
    description: Option<String>,
    episodes: Vec<EpisodeRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EpisodeRow {
    episode: u32,
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlayRow {
    title: String,
    video_id: String,
    play_auth: String,
}

impl SeriesRow {
    fn into_video(self, base: &Url) -> Video {
        Video {
            cover: absolute_url(base, &self.cover).unwrap_or(self.cover),
            id: self.id,
            title: self.title,
            rating: self.score,
            year: self.year.filter(|y| !y.is_empty()),
            area: self.area.filter(|a| !a.is_empty()),
            status: self.status.filter(|s| !s.is_empty()),
            episodes: self.total_episodes,
            actors: self.actors,
            tags: self.tags,
            description: self.description.filter(|d| !d.is_empty()),
        }
    }
}

pub struct VodPlus {
    session: FetchSession,
    api_base: String,
    region: Option<String>,
    vod_endpoint: Option<String>,
    categories: Vec<Category>,
}

impl VodPlus {
    pub fn new(source: &SourceConfig, policy: &FetchConfig) -> Result<Self, SessionError> {
        let session = FetchSession::new(source, policy)?;
        let api_base = source
            .option("api_base")
            .unwrap_or(&source.base_url)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            session,
            api_base,
            region: source.option("region").map(str::to_string),
            vod_endpoint: source.option("vod_endpoint").map(str::to_string),
            categories: parse_pairs(source.option("categories").unwrap_or(DEFAULT_CATEGORIES)),
        })
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Option<T> {
        let url = format!("{}/v1/{}", self.api_base, path);
        let envelope: Envelope<T> = self.session.get_json(&url, &options).await?;
        if envelope.code != 0 {
            warn!(
                source = %self.session.source_id(),
                code = envelope.code,
                msg = %envelope.msg,
                "API returned an error"
            );
            return None;
        }
        envelope.data
    }

    async fn series_page(&self, path: &str, options: RequestOptions, paging: Paging) -> Listing<Video> {
        let options = options
            .query("page", paging.page)
            .query("size", paging.limit);
        let Some(page) = self.call::<SeriesPage>(path, options).await else {
            return Listing::empty(paging);
        };
        let seen = paging.page as usize * paging.limit as usize;
        let has_more = seen < page.total;
        let base = self.session.base_url();
        let videos = page.list.into_iter().map(|row| row.into_video(base)).collect();
        Listing::from_page(videos, paging, has_more).with_total(page.total)
    }

    async fn series(&self, video_id: &str) -> Result<SeriesRow, SourceError> {
        let video_id = checked_slug(video_id)?;
        let row: SeriesRow = self
            .call(&format!("series/{}", video_id), RequestOptions::api())
            .await
            .ok_or_else(|| SourceError::fetch("series detail"))?;
        if row.id.is_empty() {
            return Err(SourceError::NotFound(video_id.to_string()));
        }
        Ok(row)
    }

    fn play_page(&self, series_id: &str, episode: u32) -> String {
        self.session
            .absolute(&format!("/play/{}/{}", series_id, episode))
            .unwrap_or_default()
    }
}

#[async_trait]
impl VideoSource for VodPlus {
    fn id(&self) -> &str {
        self.session.source_id()
    }

    async fn categories(&self) -> Vec<Category> {
        self.categories.clone()
    }

    async fn videos(&self, category: &str, paging: Paging) -> Listing<Video> {
        let Ok(category) = checked_slug(category) else {
            return Listing::empty(paging);
        };
        let options = RequestOptions::api().query("category", category);
        self.series_page("series", options, paging).await
    }

    async fn detail(&self, video_id: &str) -> Result<Video, SourceError> {
        let row = self.series(video_id).await?;
        Ok(row.into_video(self.session.base_url()))
    }

    async fn episodes(&self, video_id: &str) -> Result<Vec<VideoEpisode>, SourceError> {
        let row = self.series(video_id).await?;
        let mut episodes: Vec<VideoEpisode> = row
            .episodes
            .into_iter()
            .filter(|e| e.episode > 0)
            .map(|e| VideoEpisode {
                id: join_id(&[&row.id, LINE, &e.episode.to_string()]),
                series_id: row.id.clone(),
                line_id: LINE.to_string(),
                title: e.title,
                episode: e.episode,
                play_url: self.play_page(&row.id, e.episode),
            })
            .collect();
        normalize_order(&mut episodes);
        Ok(episodes)
    }

    async fn episode_detail(&self, episode_id: &str) -> Result<VideoEpisodeDetail, SourceError> {
        let parts = split_id(episode_id, 3).ok_or_else(|| SourceError::bad_id(episode_id))?;
        let series_id = checked_slug(parts[0])?;
        let number: u32 = parts[2]
            .parse()
            .map_err(|_| SourceError::bad_id(episode_id))?;
        if parts[1] != LINE {
            return Err(SourceError::bad_id(episode_id));
        }

        let options = RequestOptions::api()
            .query("seriesId", series_id)
            .query("episode", number);
        let play: PlayRow = self
            .call("play", options)
            .await
            .ok_or_else(|| SourceError::fetch("play info"))?;
        if play.play_auth.is_empty() || play.video_id.is_empty() {
            return Err(ResolveError::new(Stage::PlayAuth, "episode has no playAuth").into());
        }

        let stream = vod::resolve(
            &self.session,
            &play.play_auth,
            &play.video_id,
            self.region.as_deref(),
            self.vod_endpoint.as_deref(),
        )
        .await?;

        let episode = VideoEpisode {
            id: episode_id.to_string(),
            series_id: series_id.to_string(),
            line_id: LINE.to_string(),
            title: play.title,
            episode: number,
            play_url: self.play_page(series_id, number),
        };
        Ok(VideoEpisodeDetail::resolved(episode, stream))
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Video> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Listing::empty(paging);
        }
        let options = RequestOptions::api().query("keyword", keyword);
        self.series_page("search", options, paging).await
    }
}
