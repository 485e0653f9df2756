//! Mirror cinema running the common `provide/vod` collection API.
//!
//! Episode ids are `{vod}_{line}_{episode}` with 1-based line and episode
//! numbers. Listed play URLs that are direct streams are returned as they
//! are; anything else goes through the site's play page and, when the
//! `parser_url` option is set, its parser page.

use async_trait::async_trait;
use scraper::Html;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{FetchConfig, SourceConfig};
use crate::content::html::absolute_url;
use crate::content::{
    join_id, split_id, Category, Listing, Paging, Video, VideoEpisode, VideoEpisodeDetail,
};
use crate::fetch::{FetchSession, RequestOptions, SessionError};
use crate::resolver::literal::string_field;
use crate::resolver::{is_direct_stream, player};
use crate::sources::error::SourceError;
use crate::sources::traits::VideoSource;
use crate::sources::util::{checked_slug, parse_pairs};

const API_PATH: &str = "/api.php/provide/vod/";

const LINE_SEPARATOR: &str = "$$$";

fn non_empty(item: &Value, key: &str) -> Option<String> {
    string_field(item, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split([',', '，', '/'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn plain_text(fragment: &str) -> String {
    let fragment = Html::parse_fragment(fragment);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn parse_video(item: &Value, base: &Url) -> Option<Video> {
    let id = non_empty(item, "vod_id")?;
    checked_slug(&id).ok()?;
    Some(Video {
        title: non_empty(item, "vod_name")?,
        cover: non_empty(item, "vod_pic")
            .and_then(|pic| absolute_url(base, &pic))
            .unwrap_or_default(),
        rating: non_empty(item, "vod_score")
            .and_then(|s| s.parse::<f32>().ok())
            .filter(|s| *s > 0.0),
        year: non_empty(item, "vod_year").filter(|y| y != "0"),
        area: non_empty(item, "vod_area"),
        status: non_empty(item, "vod_remarks"),
        episodes: non_empty(item, "vod_total")
            .and_then(|t| t.parse().ok())
            .filter(|t| *t > 0),
        actors: split_list(non_empty(item, "vod_actor")),
        tags: split_list(non_empty(item, "vod_class").or_else(|| non_empty(item, "type_name"))),
        description: non_empty(item, "vod_content")
            .map(|c| plain_text(&c))
            .filter(|c| !c.is_empty()),
        id,
    })
}

/// Expand `vod_play_from` / `vod_play_url` into episodes.
///
/// Lines are separated by `$$$`, episodes by `#`, and each episode is
/// `label$url`. Lines without a single playable entry are skipped but keep
/// their number so ids stay stable.
///
/// Ids keep the per-line position (`{vod}_{line}_{n}`); `episode` counts
/// across all lines so the list is strictly increasing.
pub(crate) fn parse_episodes(item: &Value, vod_id: &str) -> Vec<VideoEpisode> {
    let play_urls = non_empty(item, "vod_play_url").unwrap_or_default();
    let mut episodes: Vec<VideoEpisode> = Vec::new();
    for (line_index, line) in play_urls.split(LINE_SEPARATOR).enumerate() {
        let line_id = (line_index + 1).to_string();
        let entries = line.split('#').map(str::trim).filter(|e| !e.is_empty());
        for (index, entry) in entries.enumerate() {
            let number = index as u32 + 1;
            let (label, url) = match entry.split_once('$') {
                Some((label, url)) => (label.trim().to_string(), url.trim()),
                None => (format!("第{}集", number), entry),
            };
            if url.is_empty() {
                continue;
            }
            episodes.push(VideoEpisode {
                id: join_id(&[vod_id, &line_id, &number.to_string()]),
                series_id: vod_id.to_string(),
                line_id: line_id.clone(),
                title: label,
                episode: episodes.len() as u32 + 1,
                play_url: url.to_string(),
            });
        }
    }
    episodes
}

/// `(items, pagecount, total)` of an API response.
fn parse_page(response: &Value) -> Option<(&Vec<Value>, u32, usize)> {
    if string_field(response, "code").as_deref() != Some("1") {
        return None;
    }
    let list = response.get("list")?.as_array()?;
    let pagecount = string_field(response, "pagecount")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
    let total = string_field(response, "total")
        .and_then(|t| t.parse().ok())
        .unwrap_or(list.len());
    Some((list, pagecount, total))
}

pub(crate) fn parse_classes(response: &Value) -> Vec<Category> {
    response
        .get("class")
        .and_then(Value::as_array)
        .map(|classes| {
            classes
                .iter()
                .filter_map(|c| Some(Category::new(non_empty(c, "type_id")?, non_empty(c, "type_name")?)))
                .collect()
        })
        .unwrap_or_default()
}

pub struct MacCms {
    session: FetchSession,
    parser_url: Option<String>,
    categories: Option<Vec<Category>>,
}

impl MacCms {
    pub fn new(source: &SourceConfig, policy: &FetchConfig) -> Result<Self, SessionError> {
        Ok(Self {
            session: FetchSession::new(source, policy)?,
            parser_url: source.option("parser_url").map(str::to_string),
            categories: source.option("categories").map(parse_pairs),
        })
    }

    async fn api(&self, options: RequestOptions) -> Option<Value> {
        let url = self.session.absolute(API_PATH)?;
        self.session.get_json(&url, &options).await
    }

    async fn listing(&self, options: RequestOptions, paging: Paging) -> Listing<Video> {
        let options = options.query("ac", "detail").query("pg", paging.page);
        let Some(response) = self.api(options).await else {
            return Listing::empty(paging);
        };
        let Some((list, pagecount, total)) = parse_page(&response) else {
            return Listing::empty(paging);
        };
        let base = self.session.base_url();
        let videos = list.iter().filter_map(|item| parse_video(item, base)).collect();
        Listing::from_page(videos, paging, paging.page < pagecount).with_total(total)
    }

    async fn item(&self, vod_id: &str) -> Result<Value, SourceError> {
        let vod_id = checked_slug(vod_id)?;
        let options = RequestOptions::api()
            .query("ac", "detail")
            .query("ids", vod_id);
        let response = self
            .api(options)
            .await
            .ok_or_else(|| SourceError::fetch("vod detail"))?;
        parse_page(&response)
            .and_then(|(list, _, _)| list.first().cloned())
            .ok_or_else(|| SourceError::NotFound(vod_id.to_string()))
    }
}

#[async_trait]
impl VideoSource for MacCms {
    fn id(&self) -> &str {
        self.session.source_id()
    }

    async fn categories(&self) -> Vec<Category> {
        if let Some(categories) = &self.categories {
            return categories.clone();
        }
        let options = RequestOptions::api().query("ac", "list");
        match self.api(options).await {
            Some(response) => parse_classes(&response),
            None => Vec::new(),
        }
    }

    async fn videos(&self, category: &str, paging: Paging) -> Listing<Video> {
        let Ok(category) = checked_slug(category) else {
            return Listing::empty(paging);
        };
        self.listing(RequestOptions::api().query("t", category), paging)
            .await
    }

    async fn detail(&self, video_id: &str) -> Result<Video, SourceError> {
        let item = self.item(video_id).await?;
        parse_video(&item, self.session.base_url()).ok_or_else(|| SourceError::parse("vod item"))
    }

    async fn episodes(&self, video_id: &str) -> Result<Vec<VideoEpisode>, SourceError> {
        let item = self.item(video_id).await?;
        Ok(parse_episodes(&item, video_id.trim()))
    }

    async fn episode_detail(&self, episode_id: &str) -> Result<VideoEpisodeDetail, SourceError> {
        let parts = split_id(episode_id, 3).ok_or_else(|| SourceError::bad_id(episode_id))?;
        let vod_id = checked_slug(parts[0])?;
        let item = self.item(vod_id).await?;
        let episode = parse_episodes(&item, vod_id)
            .into_iter()
            .find(|e| e.id == episode_id)
            .ok_or_else(|| SourceError::NotFound(episode_id.to_string()))?;

        if is_direct_stream(&episode.play_url) {
            let url = episode.play_url.clone();
            return Ok(VideoEpisodeDetail::resolved(episode, url));
        }

        let play_page = self
            .session
            .absolute(&format!(
                "/vodplay/{}-{}-{}.html",
                vod_id, episode.line_id, parts[2]
            ))
            .ok_or_else(|| SourceError::bad_id(episode_id))?;
        debug!(source = %self.id(), %play_page, "Resolving through play page");
        let page = self
            .session
            .get(&play_page)
            .await
            .ok_or_else(|| SourceError::fetch("play page"))?;
        let player_data = player::extract_player(page.text())?;
        let url = player::resolve(&self.session, &player_data, self.parser_url.as_deref()).await?;
        Ok(VideoEpisodeDetail::resolved(episode, url))
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Video> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Listing::empty(paging);
        }
        self.listing(RequestOptions::api().query("wd", keyword), paging)
            .await
    }
}
