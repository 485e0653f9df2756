//! DM5 comic portal.
//!
//! Listings and details are static HTML. Chapter images come from a signed
//! `chapterfun.ashx` call per page, each answering with a packed script
//! whose first URL is the image of that page.

use async_trait::async_trait;
use scraper::Html;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::{FetchConfig, SourceConfig};
use crate::content::html::{
    absolute_url, attr_of, background_image, first, script_global, select_all, text_of,
};
use crate::content::{
    normalize_order, Category, Comic, ComicChapter, ComicImage, ImageSet, Listing, Paging, Status,
};
use crate::fetch::{Bootstrap, FetchSession, RequestOptions, SessionError};
use crate::resolver::gather::{gather_pages, MAX_CONCURRENCY};
use crate::resolver::{packer, ResolveError, Stage};

use crate::sources::error::SourceError;
use crate::sources::traits::ComicSource;
use crate::sources::util::{checked_slug, has_next_link, last_segment, own_text, parse_pairs};

const DEFAULT_CATEGORIES: &str =
    "31:热血,26:恋爱,1:校园,3:搞笑,25:冒险,11:魔幻,17:科幻,2:治愈,7:悬疑,4:生活";

/// Signing values a chapter page exposes as script globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChapterGlobals {
    pub cid: String,
    pub mid: String,
    pub sign: String,
    pub sign_dt: String,
    pub image_count: usize,
}

impl ChapterGlobals {
    pub(crate) fn parse(page: &str) -> Option<Self> {
        Some(Self {
            cid: script_global(page, "DM5_CID")?,
            mid: script_global(page, "DM5_MID")?,
            sign: script_global(page, "DM5_VIEWSIGN")?,
            sign_dt: script_global(page, "DM5_VIEWSIGN_DT")?,
            image_count: script_global(page, "DM5_IMAGE_COUNT")?.parse().ok()?,
        })
    }
}

pub(crate) fn parse_cards(page: &str, base: &Url) -> (Vec<Comic>, bool) {
    let document = Html::parse_document(page);
    let root = document.root_element();

    let comics = select_all(root, "ul.mh-list li .mh-item")
        .into_iter()
        .filter_map(|item| {
            let href = attr_of(item, "h2.title a", "href")?;
            let id = last_segment(&href)?;
            let title = text_of(item, "h2.title a")?;
            let cover = first(item, "p.mh-cover")
                .and_then(|c| c.value().attr("style"))
                .and_then(background_image)
                .and_then(|u| absolute_url(base, &u))
                .unwrap_or_default();
            Some(Comic {
                id,
                title,
                cover,
                author: text_of(item, "p.zl").unwrap_or_default(),
                latest_chapter: text_of(item, "p.chapter a"),
                ..Default::default()
            })
        })
        .collect();

    (comics, has_next_link(root, ".page-pagination a"))
}

pub(crate) fn parse_detail(page: &str, base: &Url, comic_id: &str) -> Option<Comic> {
    let document = Html::parse_document(page);
    let root = document.root_element();
    let info = first(root, ".banner_detail_form")?;

    let title = first(info, "p.title").and_then(own_text)?;
    let authors: Vec<String> = select_all(info, "p.subtitle a")
        .into_iter()
        .filter_map(own_text)
        .collect();
    let tags = select_all(info, "p.tip a span")
        .into_iter()
        .filter_map(own_text)
        .collect();

    Some(Comic {
        id: comic_id.to_string(),
        title,
        cover: attr_of(info, ".cover img", "src")
            .and_then(|u| absolute_url(base, &u))
            .unwrap_or_default(),
        author: authors.join(", "),
        description: text_of(info, "p.content").unwrap_or_default(),
        status: text_of(info, "p.tip span.block span")
            .map(|s| Status::from_label(&s))
            .unwrap_or_default(),
        tags,
        rating: text_of(info, "span.score").and_then(|s| s.parse().ok()),
        latest_chapter: first(root, "#chapterlistload li a").and_then(own_text),
    })
}

/// Chapters are listed newest first.
pub(crate) fn parse_chapters(page: &str, comic_id: &str) -> Vec<ComicChapter> {
    let document = Html::parse_document(page);
    let links: Vec<(String, String)> = select_all(document.root_element(), "#chapterlistload li a")
        .into_iter()
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            if !href.starts_with('/') {
                return None;
            }
            Some((last_segment(href)?, own_text(a)?))
        })
        .collect();

    let count = links.len() as u32;
    let mut chapters: Vec<ComicChapter> = links
        .into_iter()
        .enumerate()
        .map(|(i, (id, title))| ComicChapter {
            id,
            comic_id: comic_id.to_string(),
            title,
            order: count - i as u32,
            updated_at: None,
        })
        .collect();
    normalize_order(&mut chapters);
    chapters
}

pub struct Dm5 {
    session: FetchSession,
    bootstrap: Bootstrap,
    cookie_url: Option<String>,
    categories: Vec<Category>,
}

impl Dm5 {
    pub fn new(source: &SourceConfig, policy: &FetchConfig) -> Result<Self, SessionError> {
        Ok(Self {
            session: FetchSession::new(source, policy)?,
            bootstrap: Bootstrap::new(),
            cookie_url: source.download.cookie_url.clone(),
            categories: parse_pairs(source.option("categories").unwrap_or(DEFAULT_CATEGORIES)),
        })
    }

    async fn listing(&self, path: &str, options: RequestOptions, paging: Paging) -> Listing<Comic> {
        let Some(url) = self.session.absolute(path) else {
            return Listing::empty(paging);
        };
        match self.session.get_with(&url, &options).await {
            Some(response) => {
                let (comics, has_next) = parse_cards(response.text(), self.session.base_url());
                Listing::from_page(comics, paging, has_next)
            }
            None => Listing::empty(paging),
        }
    }

    async fn comic_page(&self, comic_id: &str) -> Result<String, SourceError> {
        let comic_id = checked_slug(comic_id)?;
        let url = self
            .session
            .absolute(&format!("/{}/", comic_id))
            .ok_or_else(|| SourceError::bad_id(comic_id))?;
        let response = self
            .session
            .get(&url)
            .await
            .ok_or_else(|| SourceError::fetch("comic page"))?;
        Ok(response.text)
    }

    /// Image chapters need the session cookies of the home page.
    async fn ensure_cookies(&self) {
        let Some(cookie_url) = self.cookie_url.as_deref() else {
            return;
        };
        let ready = self
            .bootstrap
            .ensure(|| async { self.session.get(cookie_url).await.is_some() })
            .await;
        if !ready {
            debug!(source = %self.session.source_id(), "Cookie bootstrap failed, continuing without");
        }
    }

    async fn page_image(
        &self,
        script_url: &str,
        chapter_url: &str,
        globals: &ChapterGlobals,
        page: usize,
    ) -> Option<String> {
        let options = RequestOptions::api()
            .referer(chapter_url)
            .query("cid", &globals.cid)
            .query("page", page)
            .query("key", "")
            .query("language", 1)
            .query("gtk", 6)
            .query("_cid", &globals.cid)
            .query("_mid", &globals.mid)
            .query("_dt", &globals.sign_dt)
            .query("_sign", &globals.sign);
        let response = self.session.get_with(script_url, &options).await?;
        match packer::unpack_urls(response.text()) {
            Ok(urls) => urls.into_iter().next(),
            Err(e) => {
                debug!(page, error = %e, "Chapter script did not unpack");
                None
            }
        }
    }
}

#[async_trait]
impl ComicSource for Dm5 {
    fn id(&self) -> &str {
        self.session.source_id()
    }

    async fn categories(&self) -> Vec<Category> {
        self.categories.clone()
    }

    async fn hot(&self, paging: Paging) -> Listing<Comic> {
        let path = format!("/manhua-list-s2-p{}/", paging.page);
        self.listing(&path, RequestOptions::new(), paging).await
    }

    async fn latest(&self, paging: Paging) -> Listing<Comic> {
        let path = format!("/manhua-list-s18-p{}/", paging.page);
        self.listing(&path, RequestOptions::new(), paging).await
    }

    async fn by_category(&self, category: &str, paging: Paging) -> Listing<Comic> {
        let Ok(category) = checked_slug(category) else {
            return Listing::empty(paging);
        };
        let path = format!("/manhua-list-tag{}-p{}/", category, paging.page);
        self.listing(&path, RequestOptions::new(), paging).await
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Comic> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Listing::empty(paging);
        }
        let options = RequestOptions::new()
            .query("title", keyword)
            .query("language", 1)
            .query("page", paging.page);
        self.listing("/search", options, paging).await
    }

    async fn detail(&self, comic_id: &str) -> Result<Comic, SourceError> {
        let page = self.comic_page(comic_id).await?;
        parse_detail(&page, self.session.base_url(), comic_id.trim())
            .ok_or_else(|| SourceError::NotFound(comic_id.to_string()))
    }

    async fn chapters(&self, comic_id: &str) -> Result<Vec<ComicChapter>, SourceError> {
        let page = self.comic_page(comic_id).await?;
        Ok(parse_chapters(&page, comic_id.trim()))
    }

    async fn images(
        &self,
        chapter_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageSet, SourceError> {
        let chapter_id = checked_slug(chapter_id)?;
        let chapter_url = self
            .session
            .absolute(&format!("/{}/", chapter_id))
            .ok_or_else(|| SourceError::bad_id(chapter_id))?;
        let page = self
            .session
            .get(&chapter_url)
            .await
            .ok_or_else(|| SourceError::fetch("chapter page"))?;
        let globals = ChapterGlobals::parse(page.text())
            .ok_or_else(|| SourceError::NotFound(chapter_id.to_string()))?;

        self.ensure_cookies().await;

        let script_url = format!("{}chapterfun.ashx", chapter_url);
        let pages = gather_pages(
            (1..=globals.image_count).collect(),
            MAX_CONCURRENCY,
            cancel,
            |page| self.page_image(&script_url, &chapter_url, &globals, page),
        )
        .await?;

        let images: Vec<ComicImage> = pages
            .into_iter()
            .map(|(page, url)| ComicImage {
                page: page as u32,
                url,
            })
            .collect();
        let set = ImageSet::from_pages(images, globals.image_count);
        if set.images.is_empty() && globals.image_count > 0 {
            return Err(ResolveError::new(Stage::Gather, "no chapter page resolved").into());
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Domain;
    use crate::testing::upstream::{fixture, serve, source_row};
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;

    const TRIVIAL_PACKED: &str = r#"eval(function(p,a,c,k,e,d){e=function(c){return c};if(!''.replace(/^/,String)){while(c--)d[c]=k[c]||c;k=[function(e){return d[e]}];e=function(){return'\\w+'};c=1};while(c--)if(k[c])p=p.replace(new RegExp('\\b'+e(c)+'\\b','g'),k[c]);return p}('var d=["PAGE_URL"];',10,0,''.split('|'),0,{}))"#;

    fn base() -> Url {
        Url::parse("https://www.dm5.com/").unwrap()
    }

    async fn chapter_script(
        State(broken_page): State<Option<usize>>,
        Query(q): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        let signed = q.get("_sign").map(String::as_str) == Some("8a1e1f4c0d2b4a10b7c3e4d5f6a7b8c9")
            && q.get("_cid").map(String::as_str) == Some("119988");
        let referred = headers
            .get("referer")
            .and_then(|v| v.to_str().ok())
            .map(|r| r.ends_with("/m119988/"))
            .unwrap_or(false);
        let page: usize = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);

        if !signed || !referred {
            (StatusCode::FORBIDDEN, "unsigned").into_response()
        } else if Some(page) == broken_page {
            "var nothing = 1;".into_response()
        } else if page == 1 {
            fixture("dm5_chapterfun.js").into_response()
        } else {
            TRIVIAL_PACKED
                .replace("PAGE_URL", &format!("https://img.example/{}.jpg", page))
                .into_response()
        }
    }

    async fn adapter(broken_page: Option<usize>) -> Dm5 {
        let router = Router::new()
            .route(
                "/manhua-list-tag31-p1/",
                get(|| async { fixture("dm5_list.html") }),
            )
            .route(
                "/manhua-yiquanchaoren/",
                get(|| async { fixture("dm5_detail.html") }),
            )
            .route("/m119988/", get(|| async { fixture("dm5_chapter.html") }))
            .route("/m119988/chapterfun.ashx", get(chapter_script))
            .with_state(broken_page);
        let base = serve(router).await;
        Dm5::new(
            &source_row("dm5", Domain::Comic, &base),
            &FetchConfig::without_delay(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_cards() {
        let (comics, has_next) = parse_cards(&fixture("dm5_list.html"), &base());
        assert!(has_next);
        assert_eq!(comics.len(), 3);
        assert_eq!(comics[0].id, "manhua-yiquanchaoren");
        assert_eq!(comics[0].title, "一拳超人");
        assert_eq!(comics[0].cover, "https://mhfm.dm5.example/1/73/cover.jpg");
        assert_eq!(comics[0].author, "ONE");
        assert_eq!(comics[0].latest_chapter.as_deref(), Some("第200话"));
        assert_eq!(comics[1].cover, "https://mhfm.dm5.example/2/20/cover.jpg");

        let listing = Listing::from_page(comics, Paging::default(), has_next);
        assert_eq!(listing.items.len(), 2);
        assert!(listing.has_more);
    }

    #[test]
    fn test_parse_detail() {
        let comic = parse_detail(&fixture("dm5_detail.html"), &base(), "manhua-yiquanchaoren").unwrap();
        assert_eq!(comic.title, "一拳超人");
        assert_eq!(comic.author, "ONE, 村田雄介");
        assert_eq!(comic.status, Status::Ongoing);
        assert_eq!(comic.tags, vec!["热血", "搞笑"]);
        assert_eq!(comic.rating, Some(9.6));
        assert!(comic.description.starts_with("埼玉是一个平凡的英雄"));
        assert_eq!(comic.latest_chapter.as_deref(), Some("第200话"));
        assert!(parse_detail("<html></html>", &base(), "x").is_none());
    }

    #[test]
    fn test_parse_chapters_oldest_first() {
        let chapters = parse_chapters(&fixture("dm5_detail.html"), "manhua-yiquanchaoren");
        let ids: Vec<_> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["m119700", "m119870", "m119988"]);
        let orders: Vec<_> = chapters.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(chapters[2].title, "第200话");
    }

    #[test]
    fn test_chapter_globals() {
        let globals = ChapterGlobals::parse(&fixture("dm5_chapter.html")).unwrap();
        assert_eq!(globals.cid, "119988");
        assert_eq!(globals.mid, "73");
        assert_eq!(globals.sign_dt, "2026-10-01 12:00:00");
        assert_eq!(globals.image_count, 3);
        assert!(ChapterGlobals::parse("<html></html>").is_none());
    }

    #[tokio::test]
    async fn test_category_listing() {
        let dm5 = adapter(None).await;
        let listing = dm5.by_category("31", Paging::new(1, 20)).await;
        assert_eq!(listing.items.len(), 2);
        assert!(listing.has_more);

        // Unknown pages degrade to an empty listing.
        let empty = dm5.by_category("99", Paging::new(1, 20)).await;
        assert!(empty.items.is_empty());
        assert!(dm5.by_category("../x", Paging::default()).await.items.is_empty());
    }

    #[tokio::test]
    async fn test_detail_and_bad_id() {
        let dm5 = adapter(None).await;
        let comic = dm5.detail("manhua-yiquanchaoren").await.unwrap();
        assert_eq!(comic.id, "manhua-yiquanchaoren");
        assert!(matches!(dm5.detail("a/b").await, Err(SourceError::BadId(_))));
        assert!(matches!(dm5.detail("gone").await, Err(SourceError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_images_gathered_in_order() {
        let dm5 = adapter(None).await;
        let set = dm5.images("m119988", &CancellationToken::new()).await.unwrap();
        assert!(set.is_complete());
        assert_eq!(set.total, 3);
        assert_eq!(
            set.images[0].url,
            "https://image.dm5.example/1/73/119988/10_9412.jpg?pvalue=119988&key=dm5imagefun&uk=72fa4e46b1d09c3e"
        );
        assert_eq!(set.images[2].url, "https://img.example/3.jpg");

        let second = dm5.image("m119988", 2, &CancellationToken::new()).await.unwrap();
        assert_eq!(second.url, "https://img.example/2.jpg");
        assert!(matches!(
            dm5.image("m119988", 9, &CancellationToken::new()).await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_page_truncates_set() {
        let dm5 = adapter(Some(2)).await;
        let set = dm5.images("m119988", &CancellationToken::new()).await.unwrap();
        assert_eq!(set.total, 1);
        assert_eq!(set.expected_total, 3);
    }

    #[tokio::test]
    async fn test_first_page_failure_is_resolve_error() {
        let dm5 = adapter(Some(1)).await;
        let err = dm5.images("m119988", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::Resolve(ref e) if e.stage == Stage::Gather));
    }

    #[tokio::test]
    async fn test_cancelled_gather() {
        let dm5 = adapter(None).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = dm5.images("m119988", &cancel).await.unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }
}
