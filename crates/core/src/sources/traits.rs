//! Capability traits, one per content domain.
//!
//! List methods never fail: adapters log upstream problems and answer with
//! an empty listing. Detail and resolve methods return `SourceError`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::content::{
    Book, BookChapter, BookChapterContent, BookDetail, Category, Comic, ComicChapter, ComicImage,
    Episode, EpisodeDetail, ImageSet, Listing, Paging, Program, Video, VideoEpisode,
    VideoEpisodeDetail,
};

use super::error::SourceError;

#[async_trait]
pub trait ComicSource: Send + Sync {
    fn id(&self) -> &str;

    async fn categories(&self) -> Vec<Category>;

    async fn hot(&self, paging: Paging) -> Listing<Comic>;

    async fn latest(&self, paging: Paging) -> Listing<Comic>;

    async fn by_category(&self, category: &str, paging: Paging) -> Listing<Comic>;

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Comic>;

    async fn detail(&self, comic_id: &str) -> Result<Comic, SourceError>;

    async fn chapters(&self, comic_id: &str) -> Result<Vec<ComicChapter>, SourceError>;

    /// All images of a chapter, as the gap-free prefix of fetched pages.
    ///
    /// `cancel` fires when the client goes away.
    async fn images(
        &self,
        chapter_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageSet, SourceError>;

    /// One image of a chapter, 1-based.
    async fn image(
        &self,
        chapter_id: &str,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<ComicImage, SourceError> {
        self.images(chapter_id, cancel)
            .await?
            .images
            .into_iter()
            .find(|image| image.page == page)
            .ok_or_else(|| SourceError::NotFound(format!("{} page {}", chapter_id, page)))
    }
}

#[async_trait]
pub trait EbookSource: Send + Sync {
    fn id(&self) -> &str;

    async fn categories(&self) -> Vec<Category>;

    async fn books(&self, category: &str, paging: Paging) -> Listing<Book>;

    /// Book metadata together with its chapter list.
    async fn detail(&self, book_id: &str) -> Result<BookDetail, SourceError>;

    async fn chapters(&self, book_id: &str) -> Result<Vec<BookChapter>, SourceError>;

    async fn chapter_content(&self, chapter_id: &str) -> Result<BookChapterContent, SourceError>;

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Book>;
}

#[async_trait]
pub trait PodcastSource: Send + Sync {
    fn id(&self) -> &str;

    async fn categories(&self) -> Vec<Category>;

    async fn programs(&self, category: &str, paging: Paging) -> Listing<Program>;

    async fn hot(&self, paging: Paging) -> Listing<Program>;

    async fn latest(&self, paging: Paging) -> Listing<Program>;

    async fn detail(&self, program_id: &str) -> Result<Program, SourceError>;

    async fn episodes(&self, program_id: &str) -> Result<Vec<Episode>, SourceError>;

    /// Resolve the audio URL of one episode.
    async fn episode_detail(&self, episode_id: &str) -> Result<EpisodeDetail, SourceError>;

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Program>;
}

#[async_trait]
pub trait VideoSource: Send + Sync {
    fn id(&self) -> &str;

    async fn categories(&self) -> Vec<Category>;

    async fn videos(&self, category: &str, paging: Paging) -> Listing<Video>;

    async fn detail(&self, video_id: &str) -> Result<Video, SourceError>;

    async fn episodes(&self, video_id: &str) -> Result<Vec<VideoEpisode>, SourceError>;

    /// Resolve the stream of one episode.
    async fn episode_detail(&self, episode_id: &str) -> Result<VideoEpisodeDetail, SourceError>;

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Video>;
}
