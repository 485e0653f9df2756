//! Mock e-book source for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::content::{Book, BookChapter, BookChapterContent, BookDetail, Category, Listing, Paging};
use crate::sources::{EbookSource, SourceError};

use super::{CallLog, MockFailure, RecordedCall};

/// Mock implementation of [`EbookSource`].
///
/// `books(category)` serves the books whose `category` equals the id.
pub struct MockEbookSource {
    id: String,
    categories: Vec<Category>,
    books: Arc<RwLock<Vec<Book>>>,
    chapters: HashMap<String, Vec<BookChapter>>,
    contents: HashMap<String, BookChapterContent>,
    log: CallLog,
}

impl std::fmt::Debug for MockEbookSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEbookSource").field("id", &self.id).finish()
    }
}

impl MockEbookSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            categories: Vec::new(),
            books: Arc::new(RwLock::new(Vec::new())),
            chapters: HashMap::new(),
            contents: HashMap::new(),
            log: CallLog::default(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_books(mut self, books: Vec<Book>) -> Self {
        self.books = Arc::new(RwLock::new(books));
        self
    }

    pub fn with_chapters(mut self, book_id: &str, chapters: Vec<BookChapter>) -> Self {
        self.chapters.insert(book_id.to_string(), chapters);
        self
    }

    pub fn with_content(mut self, content: BookChapterContent) -> Self {
        self.contents.insert(content.id.clone(), content);
        self
    }

    pub async fn fail_next(&self, failure: MockFailure) {
        self.log.fail_next(failure).await;
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.log.calls().await
    }

    pub async fn call_count(&self, method: &str) -> usize {
        self.log.count(method).await
    }

    async fn find_book(&self, book_id: &str) -> Result<Book, SourceError> {
        self.books
            .read()
            .await
            .iter()
            .find(|b| b.id == book_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(book_id.to_string()))
    }
}

#[async_trait]
impl EbookSource for MockEbookSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn categories(&self) -> Vec<Category> {
        self.log.record("categories", "").await;
        self.categories.clone()
    }

    async fn books(&self, category: &str, paging: Paging) -> Listing<Book> {
        self.log.record("books", category).await;
        let books = self
            .books
            .read()
            .await
            .iter()
            .filter(|b| b.category.as_deref() == Some(category))
            .cloned()
            .collect();
        Listing::from_all(books, paging)
    }

    async fn detail(&self, book_id: &str) -> Result<BookDetail, SourceError> {
        self.log.record("detail", book_id).await;
        self.log.check_failure(book_id).await?;
        let book = self.find_book(book_id).await?;
        Ok(BookDetail {
            book,
            chapters: self.chapters.get(book_id).cloned().unwrap_or_default(),
        })
    }

    async fn chapters(&self, book_id: &str) -> Result<Vec<BookChapter>, SourceError> {
        self.log.record("chapters", book_id).await;
        self.log.check_failure(book_id).await?;
        self.find_book(book_id).await?;
        Ok(self.chapters.get(book_id).cloned().unwrap_or_default())
    }

    async fn chapter_content(&self, chapter_id: &str) -> Result<BookChapterContent, SourceError> {
        self.log.record("chapter_content", chapter_id).await;
        self.log.check_failure(chapter_id).await?;
        self.contents
            .get(chapter_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(chapter_id.to_string()))
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Book> {
        self.log.record("search", keyword).await;
        let books = self
            .books
            .read()
            .await
            .iter()
            .filter(|b| b.title.contains(keyword) || b.author.contains(keyword))
            .cloned()
            .collect();
        Listing::from_all(books, paging)
    }
}
