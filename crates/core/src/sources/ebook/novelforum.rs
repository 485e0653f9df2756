//! Serial fiction on a Discuz board.
//!
//! A book is a thread and its chapters are the pages of the thread filtered
//! to the starter's posts. Book and chapter ids wrap absolute forum URLs
//! with [`encode_url_id`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use crate::config::{FetchConfig, SourceConfig};
use crate::content::html::{attr_of, first, paragraphs, select_all, text, text_of};
use crate::content::{
    decode_url_id, encode_url_id, Book, BookChapter, BookChapterContent, BookDetail, Category,
    Listing, Paging,
};
use crate::fetch::{FetchSession, RequestOptions, SessionError};
use crate::sources::error::SourceError;
use crate::sources::traits::EbookSource;
use crate::sources::util::{checked_slug, has_next_link, parse_pairs};

static THREAD_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:thread-(\d+)-|[?&]tid=(\d+))").unwrap());

static SPACE_UID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:space-uid-(\d+)|[?&]uid=(\d+))").unwrap());

/// Edit stamps Discuz appends to posts.
const POST_NOTES: [&str; 2] = ["This post was edited by", "本帖最后由"];

const DESCRIPTION_CHARS: usize = 300;

fn first_capture(re: &Regex, haystack: &str) -> Option<String> {
    let caps = re.captures(haystack)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

fn thread_id(href: &str) -> Option<String> {
    first_capture(&THREAD_ID, href)
}

/// Canonical first-page URL of a thread.
fn thread_url(base: &Url, tid: &str) -> Option<String> {
    base.join(&format!("thread-{}-1-1.html", tid)).ok().map(String::from)
}

fn author_page_url(base: &Url, tid: &str, uid: &str, page: u32) -> Option<String> {
    base.join(&format!(
        "forum.php?mod=viewthread&tid={}&page={}&authorid={}",
        tid, page, uid
    ))
    .ok()
    .map(String::from)
}

fn post_body(cell: ElementRef<'_>) -> String {
    paragraphs(cell)
        .split("\n\n")
        .filter(|line| !POST_NOTES.iter().any(|note| line.starts_with(note)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Highest page number shown by a Discuz pager.
fn page_count(root: ElementRef<'_>) -> u32 {
    select_all(root, "div.pg a, div.pg strong")
        .into_iter()
        .filter_map(|el| {
            text(el)
                .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
                .parse::<u32>()
                .ok()
        })
        .max()
        .unwrap_or(1)
        .max(1)
}

pub(crate) fn parse_board(page: &str, base: &Url) -> (Vec<Book>, bool) {
    let document = Html::parse_document(page);
    let root = document.root_element();

    let books = select_all(root, r#"tbody[id^="normalthread_"]"#)
        .into_iter()
        .filter_map(|row| {
            let link = first(row, "a.xst")?;
            let tid = thread_id(link.value().attr("href")?)?;
            Some(Book {
                id: encode_url_id(&thread_url(base, &tid)?),
                title: text(link),
                author: text_of(row, "td.by cite a").unwrap_or_default(),
                ..Default::default()
            })
        })
        .filter(|book| !book.title.is_empty())
        .collect();

    (books, has_next_link(root, "div.pg a"))
}

pub(crate) fn parse_search(page: &str, base: &Url) -> (Vec<Book>, bool) {
    let document = Html::parse_document(page);
    let root = document.root_element();

    let books = select_all(root, "li.pbw")
        .into_iter()
        .filter_map(|item| {
            let link = first(item, "h3 a")?;
            let tid = thread_id(link.value().attr("href")?)?;
            let description = select_all(item, "p")
                .into_iter()
                .filter(|p| p.value().attr("class").is_none() && first(*p, "span").is_none())
                .map(text)
                .next()
                .unwrap_or_default();
            Some(Book {
                id: encode_url_id(&thread_url(base, &tid)?),
                title: text(link),
                author: text_of(item, r#"p span a[href*="uid"]"#).unwrap_or_default(),
                description,
                category_name: text_of(item, "p span a.xi1"),
                ..Default::default()
            })
        })
        .collect();

    (books, has_next_link(root, "div.pg a"))
}

/// Starter post of a thread's first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ThreadHead {
    pub title: String,
    pub author: String,
    pub author_uid: String,
    pub description: String,
}

pub(crate) fn parse_thread_head(page: &str) -> Option<ThreadHead> {
    let document = Html::parse_document(page);
    let root = document.root_element();
    let post = first(root, r#"#postlist div[id^="post_"]"#)?;
    let author = first(post, ".authi a.xw1")?;

    let mut description: String = first(post, "td.t_f")
        .map(post_body)
        .unwrap_or_default()
        .replace("\n\n", " ");
    if let Some((cut, _)) = description.char_indices().nth(DESCRIPTION_CHARS) {
        description.truncate(cut);
    }

    Some(ThreadHead {
        title: text_of(root, "#thread_subject")?,
        author: text(author),
        author_uid: first_capture(&SPACE_UID, author.value().attr("href")?)?,
        description,
    })
}

pub(crate) fn parse_author_page(page: &str) -> (Vec<String>, u32) {
    let document = Html::parse_document(page);
    let root = document.root_element();
    let posts = select_all(root, "#postlist td.t_f")
        .into_iter()
        .map(post_body)
        .filter(|body| !body.is_empty())
        .collect();
    (posts, page_count(root))
}

pub struct NovelForum {
    session: FetchSession,
    boards: Vec<Category>,
}

impl NovelForum {
    pub fn new(source: &SourceConfig, policy: &FetchConfig) -> Result<Self, SessionError> {
        Ok(Self {
            session: FetchSession::new(source, policy)?,
            boards: parse_pairs(source.option("boards").unwrap_or_default()),
        })
    }

    /// Unwrap an id, accepting only URLs on this forum.
    fn unwrap_id(&self, id: &str) -> Result<Url, SourceError> {
        let url = decode_url_id(id)
            .and_then(|u| Url::parse(&u).ok())
            .ok_or_else(|| SourceError::bad_id(id))?;
        if url.origin() == self.session.base_url().origin() {
            Ok(url)
        } else {
            Err(SourceError::bad_id(id))
        }
    }

    async fn fetch(&self, url: &str, what: &str) -> Result<String, SourceError> {
        self.session
            .get(url)
            .await
            .map(|r| r.text)
            .ok_or_else(|| SourceError::fetch(what))
    }

    async fn search_page(&self, keyword: &str, page: u32) -> Option<(Vec<Book>, bool)> {
        let base = self.session.base_url();
        let form_url = self.session.absolute("search.php?mod=forum")?;
        let form = self.session.get(&form_url).await?;
        let formhash = {
            let document = Html::parse_document(form.text());
            attr_of(document.root_element(), r#"input[name="formhash"]"#, "value")?
        };

        let results = self
            .session
            .post_form(
                &form_url,
                &[
                    ("formhash", formhash.as_str()),
                    ("srchtxt", keyword),
                    ("searchsubmit", "yes"),
                ],
                &RequestOptions::new().referer(form_url.as_str()),
            )
            .await?;
        if page <= 1 {
            return Some(parse_search(results.text(), base));
        }

        // Later pages are addressed through the search id of the first.
        let next = {
            let document = Html::parse_document(results.text());
            attr_of(document.root_element(), "div.pg a.nxt", "href")?
        };
        let mut url = base.join(&next).ok()?;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs)
            .append_pair("page", &page.to_string());
        let response = self.session.get(url.as_str()).await?;
        Some(parse_search(response.text(), base))
    }
}

#[async_trait]
impl EbookSource for NovelForum {
    fn id(&self) -> &str {
        self.session.source_id()
    }

    async fn categories(&self) -> Vec<Category> {
        self.boards.clone()
    }

    async fn books(&self, category: &str, paging: Paging) -> Listing<Book> {
        let Ok(board) = checked_slug(category) else {
            return Listing::empty(paging);
        };
        let Some(url) = self
            .session
            .absolute(&format!("forum-{}-{}.html", board, paging.page))
        else {
            return Listing::empty(paging);
        };
        let Some(response) = self.session.get(&url).await else {
            return Listing::empty(paging);
        };

        let (mut books, has_next) = parse_board(response.text(), self.session.base_url());
        let name = self
            .boards
            .iter()
            .find(|b| b.id == board)
            .map(|b| b.name.clone());
        for book in &mut books {
            book.category = Some(board.to_string());
            book.category_name = name.clone();
        }
        Listing::from_page(books, paging, has_next)
    }

    async fn detail(&self, book_id: &str) -> Result<BookDetail, SourceError> {
        let url = self.unwrap_id(book_id)?;
        let tid = thread_id(url.as_str()).ok_or_else(|| SourceError::bad_id(book_id))?;
        let page = self.fetch(url.as_str(), "thread page").await?;
        let head = parse_thread_head(&page).ok_or_else(|| SourceError::NotFound(book_id.to_string()))?;

        let base = self.session.base_url();
        let first_page = author_page_url(base, &tid, &head.author_uid, 1)
            .ok_or_else(|| SourceError::bad_id(book_id))?;
        let pages = match self.session.get(&first_page).await {
            Some(response) => parse_author_page(response.text()).1,
            None => 1,
        };

        let chapters: Vec<BookChapter> = (1..=pages)
            .filter_map(|n| {
                Some(BookChapter {
                    id: encode_url_id(&author_page_url(base, &tid, &head.author_uid, n)?),
                    book_id: book_id.to_string(),
                    title: format!("Page {}", n),
                    order: n,
                })
            })
            .collect();

        Ok(BookDetail {
            book: Book {
                id: book_id.to_string(),
                title: head.title,
                author: head.author,
                description: head.description,
                total_chapters: Some(chapters.len() as u32),
                ..Default::default()
            },
            chapters,
        })
    }

    async fn chapters(&self, book_id: &str) -> Result<Vec<BookChapter>, SourceError> {
        Ok(self.detail(book_id).await?.chapters)
    }

    async fn chapter_content(&self, chapter_id: &str) -> Result<BookChapterContent, SourceError> {
        let url = self.unwrap_id(chapter_id)?;
        let page_number = url
            .query_pairs()
            .find(|(k, _)| k == "page")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_else(|| "1".to_string());
        let page = self.fetch(url.as_str(), "thread page").await?;
        let (posts, _) = parse_author_page(&page);
        if posts.is_empty() {
            return Err(SourceError::parse("thread posts"));
        }
        Ok(BookChapterContent {
            id: chapter_id.to_string(),
            title: format!("Page {}", page_number),
            content: posts.join("\n\n"),
        })
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Book> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Listing::empty(paging);
        }
        match self.search_page(keyword, paging.page).await {
            Some((books, has_next)) => Listing::from_page(books, paging, has_next),
            None => Listing::empty(paging),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Domain;
    use crate::testing::upstream::{fixture, serve, source_row};
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Form, Router};
    use std::collections::HashMap;

    fn base() -> Url {
        Url::parse("https://www.novelforum.net/").unwrap()
    }

    async fn viewthread(Query(q): Query<HashMap<String, String>>) -> Response {
        match (q.get("tid").map(String::as_str), q.get("authorid").map(String::as_str)) {
            (Some("9001"), Some("42")) => {
                let page = q.get("page").cloned().unwrap_or_else(|| "1".into());
                fixture("novelforum_author_page.html")
                    .replace("PAGE", &page)
                    .into_response()
            }
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn search_form(Query(q): Query<HashMap<String, String>>) -> Response {
        if q.get("searchid").map(String::as_str) == Some("88") {
            let page = fixture("novelforum_search.html").replace("tid=9001", "tid=9003");
            return page.into_response();
        }
        fixture("novelforum_search_form.html").into_response()
    }

    async fn search_submit(Form(form): Form<HashMap<String, String>>) -> Response {
        if form.get("formhash").map(String::as_str) != Some("f3a9c2d1") {
            return (StatusCode::FORBIDDEN, "bad formhash").into_response();
        }
        fixture("novelforum_search.html").into_response()
    }

    async fn adapter() -> (NovelForum, Url) {
        let router = Router::new()
            .route("/forum-2-1.html", get(|| async { fixture("novelforum_board.html") }))
            .route(
                "/thread-9001-1-1.html",
                get(|| async { fixture("novelforum_thread.html") }),
            )
            .route("/forum.php", get(viewthread))
            .route("/search.php", get(search_form).post(search_submit));
        let base = serve(router).await;
        let mut source = source_row("novelforum", Domain::Ebook, &format!("{}/", base));
        source.options.insert("boards".into(), "2:Fantasy,3:Romance".into());
        let forum = NovelForum::new(&source, &FetchConfig::without_delay()).unwrap();
        (forum, Url::parse(&format!("{}/", base)).unwrap())
    }

    #[test]
    fn test_parse_board_skips_sticky() {
        let (books, has_next) = parse_board(&fixture("novelforum_board.html"), &base());
        assert!(has_next);
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].title, "The Ember Crown");
        assert_eq!(books[0].author, "quill");
        assert_eq!(
            decode_url_id(&books[0].id).as_deref(),
            Some("https://www.novelforum.net/thread-9001-1-1.html")
        );
        assert_eq!(
            decode_url_id(&books[1].id).as_deref(),
            Some("https://www.novelforum.net/thread-9002-1-1.html")
        );
    }

    #[test]
    fn test_parse_thread_head() {
        let head = parse_thread_head(&fixture("novelforum_thread.html")).unwrap();
        assert_eq!(head.title, "The Ember Crown");
        assert_eq!(head.author, "quill");
        assert_eq!(head.author_uid, "42");
        assert_eq!(
            head.description,
            "A crown that burns whoever wears it. Book one of a planned trilogy."
        );
    }

    #[test]
    fn test_parse_author_page_drops_edit_stamp() {
        let page = fixture("novelforum_author_page.html").replace("PAGE", "2");
        let (posts, pages) = parse_author_page(&page);
        assert_eq!(pages, 3);
        assert_eq!(
            posts,
            vec![
                "Chapter 2 begins.\n\nThe forge was cold.".to_string(),
                "Chapter 2 continues.".to_string()
            ]
        );
    }

    #[test]
    fn test_search_ids_match_board_ids() {
        let (found, has_next) = parse_search(&fixture("novelforum_search.html"), &base());
        let (listed, _) = parse_board(&fixture("novelforum_board.html"), &base());
        assert!(has_next);
        assert_eq!(found[0].id, listed[0].id);
        assert_eq!(found[0].title, "The Ember Crown");
        assert_eq!(found[0].author, "quill");
        assert_eq!(found[0].description, "A crown that burns whoever wears it.");
        assert_eq!(found[0].category_name.as_deref(), Some("Fantasy"));
    }

    #[tokio::test]
    async fn test_books_and_detail() {
        let (forum, _) = adapter().await;
        let listing = forum.books("2", Paging::default()).await;
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[0].category_name.as_deref(), Some("Fantasy"));

        let detail = forum.detail(&listing.items[0].id).await.unwrap();
        assert_eq!(detail.book.title, "The Ember Crown");
        assert_eq!(detail.chapters.len(), 3);
        assert_eq!(detail.book.total_chapters, Some(3));

        let content = forum.chapter_content(&detail.chapters[1].id).await.unwrap();
        assert_eq!(content.title, "Page 2");
        assert!(content.content.starts_with("Chapter 2 begins."));
        assert!(content.content.ends_with("Chapter 2 continues."));
    }

    #[tokio::test]
    async fn test_foreign_and_malformed_ids() {
        let (forum, _) = adapter().await;
        let foreign = encode_url_id("https://evil.example/thread-9001-1-1.html");
        assert!(matches!(forum.detail(&foreign).await, Err(SourceError::BadId(_))));
        assert!(matches!(forum.detail("%%%").await, Err(SourceError::BadId(_))));
    }

    #[tokio::test]
    async fn test_search_with_formhash() {
        let (forum, base) = adapter().await;
        let first = forum.search("ember", Paging::default()).await;
        assert_eq!(first.items.len(), 1);
        assert_eq!(
            decode_url_id(&first.items[0].id),
            Some(format!("{}thread-9001-1-1.html", base))
        );

        let second = forum.search("ember", Paging::new(2, 20)).await;
        assert_eq!(
            decode_url_id(&second.items[0].id),
            Some(format!("{}thread-9003-1-1.html", base))
        );
    }
}
