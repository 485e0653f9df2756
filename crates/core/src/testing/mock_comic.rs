//! Mock comic source for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::content::{Category, Comic, ComicChapter, ImageSet, Listing, Paging};
use crate::sources::{ComicSource, SourceError};

use super::{CallLog, MockFailure, RecordedCall};

/// Mock implementation of [`ComicSource`].
///
/// Serves whatever comics, chapters and image sets it was given, records
/// every call and can fail the next fallible call on demand.
///
/// # Example
///
/// ```rust,ignore
/// use mediahub_core::testing::{fixtures, MockComicSource, MockFailure};
///
/// let source = MockComicSource::new("mock")
///     .with_comics(vec![fixtures::comic("c1", "First")])
///     .with_chapters("c1", vec![fixtures::comic_chapter("c1", 1)]);
///
/// source.fail_next(MockFailure::NotFound).await;
/// assert!(source.detail("c1").await.is_err());
/// assert!(source.detail("c1").await.is_ok());
/// ```
pub struct MockComicSource {
    id: String,
    categories: Arc<RwLock<Vec<Category>>>,
    comics: Arc<RwLock<Vec<Comic>>>,
    chapters: Arc<RwLock<HashMap<String, Vec<ComicChapter>>>>,
    images: Arc<RwLock<HashMap<String, ImageSet>>>,
    /// Delay before `images` answers, honouring cancellation.
    image_delay: Option<Duration>,
    log: CallLog,
}

impl std::fmt::Debug for MockComicSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockComicSource")
            .field("id", &self.id)
            .field("image_delay", &self.image_delay)
            .finish()
    }
}

impl MockComicSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            categories: Arc::new(RwLock::new(Vec::new())),
            comics: Arc::new(RwLock::new(Vec::new())),
            chapters: Arc::new(RwLock::new(HashMap::new())),
            images: Arc::new(RwLock::new(HashMap::new())),
            image_delay: None,
            log: CallLog::default(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = Arc::new(RwLock::new(categories));
        self
    }

    pub fn with_comics(mut self, comics: Vec<Comic>) -> Self {
        self.comics = Arc::new(RwLock::new(comics));
        self
    }

    pub fn with_chapters(self, comic_id: &str, chapters: Vec<ComicChapter>) -> Self {
        if let Ok(mut map) = self.chapters.try_write() {
            map.insert(comic_id.to_string(), chapters);
        }
        self
    }

    pub fn with_images(self, chapter_id: &str, images: ImageSet) -> Self {
        if let Ok(mut map) = self.images.try_write() {
            map.insert(chapter_id.to_string(), images);
        }
        self
    }

    pub fn with_image_delay(mut self, delay: Duration) -> Self {
        self.image_delay = Some(delay);
        self
    }

    /// Make the next fallible call fail.
    pub async fn fail_next(&self, failure: MockFailure) {
        self.log.fail_next(failure).await;
    }

    pub async fn set_comics(&self, comics: Vec<Comic>) {
        *self.comics.write().await = comics;
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.log.calls().await
    }

    /// Number of recorded calls to `method`.
    pub async fn call_count(&self, method: &str) -> usize {
        self.log.count(method).await
    }
}

#[async_trait]
impl ComicSource for MockComicSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn categories(&self) -> Vec<Category> {
        self.log.record("categories", "").await;
        self.categories.read().await.clone()
    }

    async fn hot(&self, paging: Paging) -> Listing<Comic> {
        self.log.record("hot", &paging.page.to_string()).await;
        Listing::from_all(self.comics.read().await.clone(), paging)
    }

    async fn latest(&self, paging: Paging) -> Listing<Comic> {
        self.log.record("latest", &paging.page.to_string()).await;
        let mut comics = self.comics.read().await.clone();
        comics.reverse();
        Listing::from_all(comics, paging)
    }

    async fn by_category(&self, category: &str, paging: Paging) -> Listing<Comic> {
        self.log.record("by_category", category).await;
        let comics = self
            .comics
            .read()
            .await
            .iter()
            .filter(|c| c.tags.iter().any(|t| t == category))
            .cloned()
            .collect();
        Listing::from_all(comics, paging)
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Comic> {
        self.log.record("search", keyword).await;
        let comics = self
            .comics
            .read()
            .await
            .iter()
            .filter(|c| c.title.contains(keyword))
            .cloned()
            .collect();
        Listing::from_all(comics, paging)
    }

    async fn detail(&self, comic_id: &str) -> Result<Comic, SourceError> {
        self.log.record("detail", comic_id).await;
        self.log.check_failure(comic_id).await?;
        self.comics
            .read()
            .await
            .iter()
            .find(|c| c.id == comic_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(comic_id.to_string()))
    }

    async fn chapters(&self, comic_id: &str) -> Result<Vec<ComicChapter>, SourceError> {
        self.log.record("chapters", comic_id).await;
        self.log.check_failure(comic_id).await?;
        self.chapters
            .read()
            .await
            .get(comic_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(comic_id.to_string()))
    }

    async fn images(
        &self,
        chapter_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageSet, SourceError> {
        self.log.record("images", chapter_id).await;
        self.log.check_failure(chapter_id).await?;
        if let Some(delay) = self.image_delay {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.images
            .read()
            .await
            .get(chapter_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(chapter_id.to_string()))
    }
}
