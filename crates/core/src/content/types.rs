//! Entities returned through the façade.

use serde::{Deserialize, Serialize};

/// Entities carrying a stable id.
pub trait HasId {
    fn id(&self) -> &str;
}

/// Entities carrying a declared order (chapter or episode number).
pub trait Ordered {
    fn order(&self) -> u32;
    fn set_order(&mut self, order: u32);
}

macro_rules! has_id {
    ($($ty:ty),* $(,)?) => {
        $(impl HasId for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })*
    };
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub page: u32,
    pub limit: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Paging {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Zero-based offset of the first item.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }
}

/// Listing envelope shared by every list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

impl<T> Listing<T> {
    pub fn empty(paging: Paging) -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            total: 0,
            page: paging.page,
            limit: paging.limit,
        }
    }

    /// Overrides the total with a count reported by the site.
    pub fn with_total(mut self, total: usize) -> Self {
        self.total = total.max(self.items.len());
        self
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Listing<U> {
        Listing {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }
}

impl<T: HasId> Listing<T> {
    /// Build a listing from one parsed page.
    ///
    /// Items are de-duplicated by id (first occurrence wins) and truncated to
    /// the requested limit.
    pub fn from_page(items: Vec<T>, paging: Paging, has_more: bool) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut unique: Vec<T> = items
            .into_iter()
            .filter(|item| !item.id().is_empty() && seen.insert(item.id().to_string()))
            .collect();
        let truncated = unique.len() > paging.limit as usize;
        unique.truncate(paging.limit as usize);
        Self {
            total: unique.len(),
            items: unique,
            has_more: has_more || truncated,
            page: paging.page,
            limit: paging.limit,
        }
    }

    /// Build a listing for a site whose page size is unknown: more pages are
    /// assumed while a page comes back full.
    pub fn from_scroll(items: Vec<T>, paging: Paging) -> Self {
        let full = items.len() >= paging.limit as usize;
        Self::from_page(items, paging, full)
    }

    /// Slice a complete in-memory list.
    pub fn from_all(items: Vec<T>, paging: Paging) -> Self {
        let total = items.len();
        let offset = paging.offset();
        let page: Vec<T> = items
            .into_iter()
            .skip(offset)
            .take(paging.limit as usize)
            .collect();
        let has_more = offset + page.len() < total;
        Self {
            items: page,
            has_more,
            total,
            page: paging.page,
            limit: paging.limit,
        }
    }
}

/// Publication status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ongoing,
    Completed,
    #[default]
    Unknown,
}

impl Status {
    /// Interpret a status label as shown by the sites.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if ["完结", "完本", "已完结", "全集", "completed", "finished", "end"]
            .iter()
            .any(|k| label.contains(k))
        {
            Status::Completed
        } else if ["连载", "更新", "ongoing", "serial", "updating"]
            .iter()
            .any(|k| label.contains(k))
        {
            Status::Ongoing
        } else {
            Status::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

// =============================================================================
// Comics
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comic {
    pub id: String,
    pub title: String,
    pub cover: String,
    pub author: String,
    pub description: String,
    pub status: Status,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_chapter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicChapter {
    pub id: String,
    pub comic_id: String,
    pub title: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicImage {
    pub page: u32,
    pub url: String,
}

/// Images of one chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSet {
    pub images: Vec<ComicImage>,
    pub total: usize,
    pub expected_total: usize,
}

impl ImageSet {
    /// Assemble the set from per-page results.
    ///
    /// Pages are sorted and only the run `1..=n` without holes is kept, so a
    /// failed page truncates the set at that point.
    pub fn from_pages(mut pages: Vec<ComicImage>, expected_total: usize) -> Self {
        pages.sort_by_key(|p| p.page);
        pages.dedup_by_key(|p| p.page);
        let images: Vec<ComicImage> = pages
            .into_iter()
            .enumerate()
            .take_while(|(i, p)| p.page as usize == i + 1)
            .map(|(_, p)| p)
            .collect();
        Self {
            total: images.len(),
            expected_total: expected_total.max(images.len()),
            images,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total == self.expected_total
    }
}

// =============================================================================
// E-books
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chapters: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookChapter {
    pub id: String,
    pub book_id: String,
    pub title: String,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: Book,
    pub chapters: Vec<BookChapter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookChapterContent {
    pub id: String,
    pub title: String,
    /// Paragraphs separated by a blank line.
    pub content: String,
}

// =============================================================================
// Podcasts
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub title: String,
    pub cover: String,
    pub author: String,
    pub description: String,
    pub episode_count: u32,
    pub status: Status,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub program_id: String,
    pub title: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeDetail {
    pub id: String,
    pub title: String,
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_url: Option<String>,
}

// =============================================================================
// Videos
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    pub cover: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodes: Option<u32>,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEpisode {
    /// `seriesId_lineId_episodeNumber`
    pub id: String,
    pub series_id: String,
    pub line_id: String,
    pub title: String,
    pub episode: u32,
    pub play_url: String,
}

/// Container hint for a resolved stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    Hls,
    Mp4,
    #[default]
    Unknown,
}

impl StreamFormat {
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".m3u8") {
            StreamFormat::Hls
        } else if path.ends_with(".mp4") {
            StreamFormat::Mp4
        } else {
            StreamFormat::Unknown
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEpisodeDetail {
    #[serde(flatten)]
    pub episode: VideoEpisode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub format: StreamFormat,
}

impl VideoEpisodeDetail {
    pub fn resolved(episode: VideoEpisode, video_url: String) -> Self {
        Self {
            format: StreamFormat::from_url(&video_url),
            episode,
            video_url: Some(video_url),
        }
    }
}

has_id!(Comic, ComicChapter, Book, BookChapter, Program, Episode, Video, VideoEpisode, Category);

impl Ordered for ComicChapter {
    fn order(&self) -> u32 {
        self.order
    }
    fn set_order(&mut self, order: u32) {
        self.order = order;
    }
}

impl Ordered for BookChapter {
    fn order(&self) -> u32 {
        self.order
    }
    fn set_order(&mut self, order: u32) {
        self.order = order;
    }
}

impl Ordered for Episode {
    fn order(&self) -> u32 {
        self.order
    }
    fn set_order(&mut self, order: u32) {
        self.order = order;
    }
}

impl Ordered for VideoEpisode {
    fn order(&self) -> u32 {
        self.episode
    }
    fn set_order(&mut self, order: u32) {
        self.episode = order;
    }
}

/// Sort chapters or episodes by declared order.
///
/// Duplicate ids are dropped. If the declared orders are not strictly
/// increasing after sorting, or start at 0, the list is renumbered from 1.
pub fn normalize_order<T: HasId + Ordered>(items: &mut Vec<T>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.id().to_string()));
    items.sort_by_key(|item| item.order());

    let strictly_increasing = items.windows(2).all(|w| w[0].order() < w[1].order());
    let starts_above_zero = items.first().map(|i| i.order() >= 1).unwrap_or(true);
    if !strictly_increasing || !starts_above_zero {
        for (i, item) in items.iter_mut().enumerate() {
            item.set_order(i as u32 + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comic(id: &str) -> Comic {
        Comic {
            id: id.to_string(),
            title: format!("Comic {}", id),
            ..Default::default()
        }
    }

    fn chapter(id: &str, order: u32) -> ComicChapter {
        ComicChapter {
            id: id.to_string(),
            comic_id: "c".to_string(),
            title: id.to_string(),
            order,
            updated_at: None,
        }
    }

    #[test]
    fn test_listing_dedups_and_truncates() {
        let items = vec![comic("a"), comic("b"), comic("a"), comic("c"), comic("d")];
        let listing = Listing::from_page(items, Paging::new(1, 3), false);
        let ids: Vec<_> = listing.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(listing.has_more);
        assert_eq!(listing.total, 3);
    }

    #[test]
    fn test_listing_drops_missing_ids() {
        let items = vec![comic(""), comic("x")];
        let listing = Listing::from_page(items, Paging::default(), false);
        assert_eq!(listing.items.len(), 1);
        assert!(!listing.has_more);
    }

    #[test]
    fn test_listing_from_scroll() {
        let full = Listing::from_scroll(vec![comic("a"), comic("b")], Paging::new(1, 2));
        assert!(full.has_more);
        let short = Listing::from_scroll(vec![comic("a")], Paging::new(2, 2));
        assert!(!short.has_more);
        assert_eq!(short.page, 2);
    }

    #[test]
    fn test_listing_from_all_slices() {
        let items: Vec<_> = (1..=5).map(|i| comic(&i.to_string())).collect();
        let listing = Listing::from_all(items, Paging::new(2, 2));
        let ids: Vec<_> = listing.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "4"]);
        assert_eq!(listing.total, 5);
        assert!(listing.has_more);
    }

    #[test]
    fn test_listing_serializes_camel_case() {
        let listing = Listing::<Comic>::empty(Paging::default());
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["hasMore"], false);
        assert_eq!(json["limit"], 20);
        assert!(json["items"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_normalize_order_sorts() {
        let mut chapters = vec![chapter("c", 3), chapter("a", 1), chapter("b", 2)];
        normalize_order(&mut chapters);
        let orders: Vec<_> = chapters.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(chapters[0].id, "a");
    }

    #[test]
    fn test_normalize_order_keeps_displayed_start() {
        let mut chapters = vec![chapter("b", 11), chapter("a", 10)];
        normalize_order(&mut chapters);
        assert_eq!(chapters[0].order, 10);
        assert_eq!(chapters[1].order, 11);
    }

    #[test]
    fn test_normalize_order_renumbers_duplicates() {
        let mut chapters = vec![
            chapter("a", 0),
            chapter("b", 0),
            chapter("c", 0),
            chapter("c", 0),
        ];
        normalize_order(&mut chapters);
        let orders: Vec<_> = chapters.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_image_set_keeps_gap_free_prefix() {
        let pages = vec![
            ComicImage { page: 3, url: "https://x/3.jpg".into() },
            ComicImage { page: 1, url: "https://x/1.jpg".into() },
            ComicImage { page: 2, url: "https://x/2.jpg".into() },
            ComicImage { page: 5, url: "https://x/5.jpg".into() },
        ];
        let set = ImageSet::from_pages(pages, 5);
        let numbers: Vec<_> = set.images.iter().map(|i| i.page).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(set.total, 3);
        assert_eq!(set.expected_total, 5);
        assert!(!set.is_complete());
    }

    #[test]
    fn test_image_set_missing_first_page_is_empty() {
        let pages = vec![ComicImage { page: 2, url: "https://x/2.jpg".into() }];
        let set = ImageSet::from_pages(pages, 2);
        assert!(set.images.is_empty());
        assert_eq!(set.total, 0);
    }

    #[test]
    fn test_status_from_label() {
        assert_eq!(Status::from_label("已完结"), Status::Completed);
        assert_eq!(Status::from_label("连载中"), Status::Ongoing);
        assert_eq!(Status::from_label("Completed"), Status::Completed);
        assert_eq!(Status::from_label("?"), Status::Unknown);
    }

    #[test]
    fn test_stream_format_from_url() {
        assert_eq!(
            StreamFormat::from_url("https://cdn.example/a/index.m3u8?t=1"),
            StreamFormat::Hls
        );
        assert_eq!(StreamFormat::from_url("https://cdn.example/a.MP4"), StreamFormat::Mp4);
        assert_eq!(StreamFormat::from_url("https://cdn.example/play"), StreamFormat::Unknown);
    }

    #[test]
    fn test_book_detail_flattens() {
        let detail = BookDetail {
            book: Book {
                id: "1".into(),
                title: "T".into(),
                total_chapters: Some(2),
                ..Default::default()
            },
            chapters: vec![],
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], "1");
        assert_eq!(json["totalChapters"], 2);
        assert!(json["chapters"].is_array());
    }
}
