//! Biquge web novel library.
//!
//! Pages are usually GBK encoded; the fetch layer decodes them. Chapter ids
//! are `{book}_{chapter}`.

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use url::Url;

use crate::config::{FetchConfig, SourceConfig};
use crate::content::html::{absolute_url, attr_of, first, paragraphs, select_all, text, text_of};
use crate::content::{
    join_id, normalize_order, split_id, Book, BookChapter, BookChapterContent, BookDetail,
    Category, Listing, Paging, Status,
};
use crate::fetch::{FetchSession, RequestOptions, SessionError};
use crate::sources::error::SourceError;
use crate::sources::traits::EbookSource;
use crate::sources::util::{after_label, checked_slug, has_next_link, last_segment, parse_pairs};

const DEFAULT_CATEGORIES: &str =
    "1:玄幻奇幻,2:武侠仙侠,3:都市言情,4:历史军事,5:科幻灵异,6:网游竞技,7:女频频道";

/// Lines injected into chapter bodies by the site.
const AD_MARKERS: [&str; 3] = ["请记住本书首发域名", "手机版阅读网址", "最新章节！"];

fn book_slug(href: &str) -> Option<String> {
    let rest = href.split("/book/").nth(1)?;
    let slug = rest.split(['/', '?', '#']).next()?;
    checked_slug(slug).ok().map(str::to_string)
}

fn chapter_slug(href: &str) -> Option<String> {
    let file = last_segment(href)?;
    checked_slug(file.trim_end_matches(".html"))
        .ok()
        .map(str::to_string)
}

fn meta_property(root: ElementRef<'_>, property: &str) -> Option<String> {
    attr_of(root, &format!(r#"meta[property="{}"]"#, property), "content")
}

pub(crate) fn parse_sort_page(page: &str) -> (Vec<Book>, bool) {
    let document = Html::parse_document(page);
    let root = document.root_element();

    let books = select_all(root, "#newscontent ul li")
        .into_iter()
        .filter_map(|row| {
            let id = book_slug(&attr_of(row, "span.s2 a", "href")?)?;
            Some(Book {
                id,
                title: text_of(row, "span.s2 a")?,
                author: text_of(row, "span.s4").unwrap_or_default(),
                description: text_of(row, "span.s3 a")
                    .map(|latest| format!("最新：{}", latest))
                    .unwrap_or_default(),
                ..Default::default()
            })
        })
        .collect();

    (books, has_next_link(root, "#pagelink a"))
}

pub(crate) fn parse_search_page(page: &str, base: &Url) -> (Vec<Book>, bool) {
    let document = Html::parse_document(page);
    let root = document.root_element();

    let books = select_all(root, ".result-list .result-item")
        .into_iter()
        .filter_map(|item| {
            let id = book_slug(&attr_of(item, "h3 a", "href")?)?;
            let title = attr_of(item, "h3 a", "title").or_else(|| text_of(item, "h3 a"))?;
            let mut author = String::new();
            let mut category = None;
            for info in select_all(item, ".result-game-item-info p") {
                let spans = select_all(info, "span");
                let (Some(label), Some(value)) = (spans.first(), spans.get(1)) else {
                    continue;
                };
                let label = text(*label);
                if label.contains("作者") {
                    author = text(*value);
                } else if label.contains("类型") {
                    category = Some(text(*value));
                }
            }
            Some(Book {
                id,
                title,
                author,
                description: text_of(item, ".result-game-item-desc").unwrap_or_default(),
                cover: attr_of(item, "img", "src")
                    .and_then(|u| absolute_url(base, &u))
                    .unwrap_or_default(),
                category_name: category,
                ..Default::default()
            })
        })
        .collect();

    (books, has_next_link(root, ".search-result-page a"))
}

pub(crate) fn parse_book(page: &str, base: &Url, book_id: &str) -> Option<BookDetail> {
    let document = Html::parse_document(page);
    let root = document.root_element();
    let info = first(root, "#info")?;

    let author = meta_property(root, "og:novel:author").or_else(|| {
        select_all(info, "p")
            .into_iter()
            .map(text)
            .find(|p| p.starts_with('作'))
            .map(|p| after_label(&p))
    });
    let chapters = parse_chapter_list(root, book_id);

    let book = Book {
        id: book_id.to_string(),
        title: text_of(info, "h1")?,
        author: author.unwrap_or_default(),
        description: meta_property(root, "og:description").unwrap_or_default(),
        cover: meta_property(root, "og:image")
            .and_then(|u| absolute_url(base, &u))
            .unwrap_or_default(),
        status: meta_property(root, "og:novel:status").map(|s| Status::from_label(&s)),
        total_chapters: Some(chapters.len() as u32),
        category: None,
        category_name: meta_property(root, "og:novel:category"),
    };
    Some(BookDetail { book, chapters })
}

/// Chapters of the catalogue.
///
/// The list opens with a "latest chapters" block; only entries after the
/// last `<dt>` belong to the full table of contents.
fn parse_chapter_list(root: ElementRef<'_>, book_id: &str) -> Vec<BookChapter> {
    let Some(list) = first(root, "#list dl") else {
        return Vec::new();
    };
    let mut entries: Vec<ElementRef<'_>> = Vec::new();
    for child in list.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "dt" => entries.clear(),
            "dd" => entries.push(child),
            _ => {}
        }
    }

    let mut chapters: Vec<BookChapter> = entries
        .into_iter()
        .filter_map(|dd| {
            let a = first(dd, "a")?;
            let chapter = chapter_slug(a.value().attr("href")?)?;
            Some((chapter, text(a)))
        })
        .enumerate()
        .map(|(i, (chapter, title))| BookChapter {
            id: join_id(&[book_id, &chapter]),
            book_id: book_id.to_string(),
            title,
            order: i as u32 + 1,
        })
        .collect();
    normalize_order(&mut chapters);
    chapters
}

pub(crate) fn parse_chapter(page: &str, chapter_id: &str) -> Option<BookChapterContent> {
    let document = Html::parse_document(page);
    let root = document.root_element();
    let body = first(root, "#content")?;

    let content = paragraphs(body)
        .split("\n\n")
        .filter(|p| !AD_MARKERS.iter().any(|ad| p.contains(ad)))
        .collect::<Vec<_>>()
        .join("\n\n");

    Some(BookChapterContent {
        id: chapter_id.to_string(),
        title: text_of(root, ".bookname h1").unwrap_or_default(),
        content,
    })
}

pub struct Biquge {
    session: FetchSession,
    categories: Vec<Category>,
}

impl Biquge {
    pub fn new(source: &SourceConfig, policy: &FetchConfig) -> Result<Self, SessionError> {
        Ok(Self {
            session: FetchSession::new(source, policy)?,
            categories: parse_pairs(source.option("categories").unwrap_or(DEFAULT_CATEGORIES)),
        })
    }

    async fn page(&self, path: &str, what: &str) -> Result<String, SourceError> {
        let url = self
            .session
            .absolute(path)
            .ok_or_else(|| SourceError::bad_id(path))?;
        self.session
            .get(&url)
            .await
            .map(|r| r.text)
            .ok_or_else(|| SourceError::fetch(what))
    }

    fn category_name(&self, category: &str) -> Option<String> {
        self.categories
            .iter()
            .find(|c| c.id == category)
            .map(|c| c.name.clone())
    }
}

#[async_trait]
impl EbookSource for Biquge {
    fn id(&self) -> &str {
        self.session.source_id()
    }

    async fn categories(&self) -> Vec<Category> {
        self.categories.clone()
    }

    async fn books(&self, category: &str, paging: Paging) -> Listing<Book> {
        let Ok(category) = checked_slug(category) else {
            return Listing::empty(paging);
        };
        let path = format!("/sort/{}_{}/", category, paging.page);
        let Ok(page) = self.page(&path, "category page").await else {
            return Listing::empty(paging);
        };
        let (mut books, has_next) = parse_sort_page(&page);
        let name = self.category_name(category);
        for book in &mut books {
            book.category = Some(category.to_string());
            book.category_name = name.clone();
        }
        Listing::from_page(books, paging, has_next)
    }

    async fn detail(&self, book_id: &str) -> Result<BookDetail, SourceError> {
        let book_id = checked_slug(book_id)?;
        let page = self.page(&format!("/book/{}/", book_id), "book page").await?;
        parse_book(&page, self.session.base_url(), book_id)
            .ok_or_else(|| SourceError::NotFound(book_id.to_string()))
    }

    async fn chapters(&self, book_id: &str) -> Result<Vec<BookChapter>, SourceError> {
        Ok(self.detail(book_id).await?.chapters)
    }

    async fn chapter_content(&self, chapter_id: &str) -> Result<BookChapterContent, SourceError> {
        let parts = split_id(chapter_id, 2).ok_or_else(|| SourceError::bad_id(chapter_id))?;
        let book = checked_slug(parts[0])?;
        let chapter = checked_slug(parts[1])?;
        let page = self
            .page(&format!("/book/{}/{}.html", book, chapter), "chapter page")
            .await?;
        parse_chapter(&page, chapter_id).ok_or_else(|| SourceError::parse("chapter body"))
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Book> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Listing::empty(paging);
        }
        let Some(url) = self.session.absolute("/search.php") else {
            return Listing::empty(paging);
        };
        let options = RequestOptions::new()
            .query("keyword", keyword)
            .query("page", paging.page);
        match self.session.get_with(&url, &options).await {
            Some(response) => {
                let (books, has_next) = parse_search_page(response.text(), self.session.base_url());
                Listing::from_page(books, paging, has_next)
            }
            None => Listing::empty(paging),
        }
    }
}
