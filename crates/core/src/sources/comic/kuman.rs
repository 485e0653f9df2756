//! Kuman comic reader.
//!
//! Each chapter page carries exactly one image, so a chapter is read by
//! fetching every page concurrently. Chapter ids are `{comic}_{chapter}`.

use async_trait::async_trait;
use scraper::Html;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{FetchConfig, SourceConfig};
use crate::content::html::{absolute_url, attr_of, first, image_src, select_all, text, text_of};
use crate::content::{
    join_id, normalize_order, split_id, Category, Comic, ComicChapter, ComicImage, ImageSet,
    Listing, Paging, Status,
};
use crate::fetch::{FetchSession, RequestOptions, SessionError};
use crate::resolver::gather::{gather_pages, MAX_CONCURRENCY};
use crate::sources::error::SourceError;
use crate::sources::traits::ComicSource;
use crate::sources::util::{after_label, checked_slug, has_next_link, last_segment, parse_pairs};

const DEFAULT_CATEGORIES: &str = "1:玄幻,2:都市,3:恋爱,4:冒险,5:搞笑,6:热血,7:古风,8:悬疑";

/// Comic slug of a `/comic/{slug}/…` link.
fn comic_slug(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next()?;
    let rest = path.split("/comic/").nth(1)?;
    let slug = rest.split('/').next()?;
    checked_slug(slug).ok().map(str::to_string)
}

pub(crate) fn parse_cards(page: &str, base: &Url) -> (Vec<Comic>, bool) {
    let document = Html::parse_document(page);
    let root = document.root_element();

    let comics = select_all(root, ".comic-list .comic-item")
        .into_iter()
        .filter_map(|item| {
            let id = comic_slug(&attr_of(item, "h3 a", "href")?)?;
            let cover = first(item, "a.cover img")
                .and_then(image_src)
                .and_then(|u| absolute_url(base, &u))
                .unwrap_or_default();
            let update = text_of(item, "p.update");
            Some(Comic {
                id,
                title: text_of(item, "h3 a")?,
                cover,
                author: text_of(item, "p.author")
                    .map(|a| after_label(&a))
                    .unwrap_or_default(),
                status: update
                    .as_deref()
                    .map(Status::from_label)
                    .unwrap_or_default(),
                latest_chapter: update.map(|u| after_label(&u)),
                ..Default::default()
            })
        })
        .collect();

    (comics, has_next_link(root, ".pagination a"))
}

pub(crate) fn parse_detail(page: &str, base: &Url, comic_id: &str) -> Option<Comic> {
    let document = Html::parse_document(page);
    let root = document.root_element();
    let info = first(root, ".comic-info")?;

    Some(Comic {
        id: comic_id.to_string(),
        title: text_of(info, "h1")?,
        cover: attr_of(info, ".cover img", "src")
            .and_then(|u| absolute_url(base, &u))
            .unwrap_or_default(),
        author: text_of(info, "p.author")
            .map(|a| after_label(&a))
            .unwrap_or_default(),
        description: text_of(info, ".intro").unwrap_or_default(),
        status: text_of(info, "p.status")
            .map(|s| Status::from_label(&s))
            .unwrap_or_default(),
        tags: select_all(info, ".tags a")
            .into_iter()
            .map(text)
            .filter(|t| !t.is_empty())
            .collect(),
        rating: None,
        latest_chapter: select_all(root, "#chapter-list li a")
            .last()
            .map(|a| text(*a)),
    })
}

/// Chapters are listed oldest first.
pub(crate) fn parse_chapters(page: &str, comic_id: &str) -> Vec<ComicChapter> {
    let document = Html::parse_document(page);
    let mut seen = std::collections::HashSet::new();
    let mut chapters: Vec<ComicChapter> = select_all(document.root_element(), "#chapter-list li a")
        .into_iter()
        .filter_map(|a| {
            let file = last_segment(a.value().attr("href")?)?;
            let chapter = checked_slug(file.trim_end_matches(".html")).ok()?.to_string();
            Some((chapter, text(a)))
        })
        .filter(|(chapter, _)| seen.insert(chapter.clone()))
        .enumerate()
        .map(|(i, (chapter, title))| ComicChapter {
            id: join_id(&[comic_id, &chapter]),
            comic_id: comic_id.to_string(),
            title,
            order: i as u32 + 1,
            updated_at: None,
        })
        .collect();
    normalize_order(&mut chapters);
    chapters
}

/// Image of one reader page and the page count it announces.
pub(crate) fn parse_reader_page(page: &str, base: &Url) -> Option<(String, Option<usize>)> {
    let document = Html::parse_document(page);
    let root = document.root_element();
    let image = first(root, "img#comic-image")
        .and_then(image_src)
        .and_then(|u| absolute_url(base, &u))?;
    let total = text_of(root, "#page-total").and_then(|t| t.parse().ok());
    Some((image, total))
}

pub struct Kuman {
    session: FetchSession,
    categories: Vec<Category>,
}

impl Kuman {
    pub fn new(source: &SourceConfig, policy: &FetchConfig) -> Result<Self, SessionError> {
        Ok(Self {
            session: FetchSession::new(source, policy)?,
            categories: parse_pairs(source.option("categories").unwrap_or(DEFAULT_CATEGORIES)),
        })
    }

    async fn listing(&self, path: &str, options: RequestOptions, paging: Paging) -> Listing<Comic> {
        let Some(url) = self.session.absolute(path) else {
            return Listing::empty(paging);
        };
        match self.session.get_with(&url, &options.query("page", paging.page)).await {
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
            .absolute(&format!("/comic/{}/", comic_id))
            .ok_or_else(|| SourceError::bad_id(comic_id))?;
        self.session
            .get(&url)
            .await
            .map(|r| r.text)
            .ok_or_else(|| SourceError::fetch("comic page"))
    }

    fn reader_url(&self, comic: &str, chapter: &str, page: usize) -> Option<String> {
        let file = if page <= 1 {
            format!("{}.html", chapter)
        } else {
            format!("{}_{}.html", chapter, page)
        };
        self.session.absolute(&format!("/comic/{}/{}", comic, file))
    }

    async fn reader_page(&self, url: &str) -> Option<(String, Option<usize>)> {
        let response = self.session.get(url).await?;
        parse_reader_page(response.text(), self.session.base_url())
    }
}

#[async_trait]
impl ComicSource for Kuman {
    fn id(&self) -> &str {
        self.session.source_id()
    }

    async fn categories(&self) -> Vec<Category> {
        self.categories.clone()
    }

    async fn hot(&self, paging: Paging) -> Listing<Comic> {
        self.listing("/hot/", RequestOptions::new(), paging).await
    }

    async fn latest(&self, paging: Paging) -> Listing<Comic> {
        self.listing("/update/", RequestOptions::new(), paging).await
    }

    async fn by_category(&self, category: &str, paging: Paging) -> Listing<Comic> {
        let Ok(category) = checked_slug(category) else {
            return Listing::empty(paging);
        };
        self.listing(&format!("/sort/{}/", category), RequestOptions::new(), paging)
            .await
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Comic> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Listing::empty(paging);
        }
        let options = RequestOptions::new().query("keyword", keyword);
        self.listing("/search/", options, paging).await
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
        let parts = split_id(chapter_id, 2).ok_or_else(|| SourceError::bad_id(chapter_id))?;
        let comic = checked_slug(parts[0])?;
        let chapter = checked_slug(parts[1])?;

        let first_url = self
            .reader_url(comic, chapter, 1)
            .ok_or_else(|| SourceError::bad_id(chapter_id))?;
        let (first_image, total) = self
            .reader_page(&first_url)
            .await
            .ok_or_else(|| SourceError::fetch("reader page"))?;
        let total = total.unwrap_or(1).max(1);

        let rest = gather_pages((2..=total).collect(), MAX_CONCURRENCY, cancel, |page| async move {
            let url = self.reader_url(comic, chapter, page)?;
            self.reader_page(&url).await.map(|(image, _)| image)
        })
        .await?;

        let images = std::iter::once((1, first_image))
            .chain(rest)
            .map(|(page, url)| ComicImage {
                page: page as u32,
                url,
            })
            .collect();
        Ok(ImageSet::from_pages(images, total))
    }
}
