//! Testing utilities and mock sources for E2E tests.
//!
//! This module provides mock implementations of the four source traits,
//! allowing the façade to be exercised without reaching any upstream site.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediahub_core::testing::{fixtures, MockVideoSource};
//!
//! let source = MockVideoSource::new("mock")
//!     .with_videos(vec![fixtures::video("v1", "Night Train", "drama")])
//!     .with_episodes("v1", vec![fixtures::video_episode("v1", 1)])
//!     .with_stream("v1_1_1", "https://cdn.example/v1/1.m3u8");
//!
//! // Register it in a SourceFactory and build the AppState...
//! ```

mod mock_comic;
mod mock_ebook;
mod mock_podcast;
mod mock_video;
#[cfg(test)]
pub(crate) mod upstream;

pub use mock_comic::MockComicSource;
pub use mock_ebook::MockEbookSource;
pub use mock_podcast::MockPodcastSource;
pub use mock_video::MockVideoSource;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::resolver::{ResolveError, Stage};
use crate::sources::SourceError;

/// A recorded source call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Trait method name, e.g. `"detail"`.
    pub method: &'static str,
    /// The id, category or keyword it was called with.
    pub arg: String,
}

impl RecordedCall {
    pub fn new(method: &'static str, arg: &str) -> Self {
        Self {
            method,
            arg: arg.to_string(),
        }
    }
}

/// Failure a mock returns from its next fallible call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    NotFound,
    BadId,
    Fetch,
    Resolve(Stage),
    Cancelled,
}

impl MockFailure {
    pub fn to_error(self, id: &str) -> SourceError {
        match self {
            MockFailure::NotFound => SourceError::NotFound(id.to_string()),
            MockFailure::BadId => SourceError::bad_id(id),
            MockFailure::Fetch => SourceError::fetch("mock upstream"),
            MockFailure::Resolve(stage) => ResolveError::new(stage, "mock failure").into(),
            MockFailure::Cancelled => SourceError::Cancelled,
        }
    }
}

/// Call log and one-shot failure switch shared by the mocks.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog {
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    next_failure: Arc<RwLock<Option<MockFailure>>>,
}

impl CallLog {
    pub(crate) async fn record(&self, method: &'static str, arg: &str) {
        self.calls.write().await.push(RecordedCall::new(method, arg));
    }

    pub(crate) async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub(crate) async fn count(&self, method: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub(crate) async fn fail_next(&self, failure: MockFailure) {
        *self.next_failure.write().await = Some(failure);
    }

    pub(crate) async fn check_failure(&self, id: &str) -> Result<(), SourceError> {
        match self.next_failure.write().await.take() {
            Some(failure) => Err(failure.to_error(id)),
            None => Ok(()),
        }
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::content::{
        join_id, Book, BookChapter, BookChapterContent, Category, Comic, ComicChapter, ComicImage,
        Episode, EpisodeDetail, ImageSet, Program, Status, Video, VideoEpisode,
    };

    pub fn categories(pairs: &[(&str, &str)]) -> Vec<Category> {
        pairs
            .iter()
            .map(|(id, name)| Category::new(*id, *name))
            .collect()
    }

    /// A comic tagged with its own id, so `by_category(id)` finds it.
    pub fn comic(id: &str, title: &str) -> Comic {
        Comic {
            id: id.to_string(),
            title: title.to_string(),
            cover: format!("https://img.example/{}.jpg", id),
            author: "Mock Author".to_string(),
            description: format!("About {}", title),
            status: Status::Ongoing,
            tags: vec![id.to_string()],
            rating: None,
            latest_chapter: None,
        }
    }

    /// Chapter `{comic}_{n}`.
    pub fn comic_chapter(comic_id: &str, order: u32) -> ComicChapter {
        ComicChapter {
            id: join_id(&[comic_id, &order.to_string()]),
            comic_id: comic_id.to_string(),
            title: format!("Chapter {}", order),
            order,
            updated_at: None,
        }
    }

    /// A complete set of `pages` images.
    pub fn image_set(pages: u32) -> ImageSet {
        let images = (1..=pages)
            .map(|page| ComicImage {
                page,
                url: format!("https://img.example/pages/{}.jpg", page),
            })
            .collect();
        ImageSet::from_pages(images, pages as usize)
    }

    pub fn book(id: &str, title: &str, category: &str) -> Book {
        Book {
            id: id.to_string(),
            title: title.to_string(),
            author: "Mock Writer".to_string(),
            description: format!("About {}", title),
            cover: format!("https://img.example/books/{}.jpg", id),
            status: Some(Status::Completed),
            total_chapters: None,
            category: Some(category.to_string()),
            category_name: None,
        }
    }

    /// Chapter `{book}_{n}`.
    pub fn book_chapter(book_id: &str, order: u32) -> BookChapter {
        BookChapter {
            id: join_id(&[book_id, &order.to_string()]),
            book_id: book_id.to_string(),
            title: format!("Chapter {}", order),
            order,
        }
    }

    pub fn chapter_content(chapter_id: &str, paragraphs: &[&str]) -> BookChapterContent {
        BookChapterContent {
            id: chapter_id.to_string(),
            title: format!("Chapter {}", chapter_id),
            content: paragraphs.join("\n\n"),
        }
    }

    pub fn program(id: &str, title: &str) -> Program {
        Program {
            id: id.to_string(),
            title: title.to_string(),
            cover: format!("https://img.example/programs/{}.jpg", id),
            author: "Mock Narrator".to_string(),
            description: String::new(),
            episode_count: 0,
            status: Status::Ongoing,
        }
    }

    /// Episode `{program}_{n}`.
    pub fn episode(program_id: &str, order: u32) -> Episode {
        Episode {
            id: join_id(&[program_id, &order.to_string()]),
            program_id: program_id.to_string(),
            title: format!("Episode {}", order),
            order,
            duration: None,
            published_at: None,
        }
    }

    pub fn episode_detail(episode_id: &str, audio_url: &str) -> EpisodeDetail {
        EpisodeDetail {
            id: episode_id.to_string(),
            title: format!("Episode {}", episode_id),
            audio_url: audio_url.to_string(),
            backup_url: None,
        }
    }

    /// A video tagged with `category`.
    pub fn video(id: &str, title: &str, category: &str) -> Video {
        Video {
            id: id.to_string(),
            title: title.to_string(),
            cover: format!("https://img.example/videos/{}.jpg", id),
            tags: vec![category.to_string()],
            ..Default::default()
        }
    }

    /// Episode `{video}_1_{n}` on line 1.
    pub fn video_episode(video_id: &str, episode: u32) -> VideoEpisode {
        VideoEpisode {
            id: join_id(&[video_id, "1", &episode.to_string()]),
            series_id: video_id.to_string(),
            line_id: "1".to_string(),
            title: format!("Episode {}", episode),
            episode,
            play_url: format!("https://play.example/{}/{}", video_id, episode),
        }
    }
}
