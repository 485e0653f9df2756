//! Mock video source for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::content::{Category, Listing, Paging, Video, VideoEpisode, VideoEpisodeDetail};
use crate::resolver::{ResolveError, Stage};
use crate::sources::{SourceError, VideoSource};

use super::{CallLog, MockFailure, RecordedCall};

/// Mock implementation of [`VideoSource`].
///
/// `videos(category)` serves the videos tagged with the category id. An
/// episode without a configured stream fails to resolve at the parser stage.
pub struct MockVideoSource {
    id: String,
    categories: Vec<Category>,
    videos: Arc<RwLock<Vec<Video>>>,
    episodes: HashMap<String, Vec<VideoEpisode>>,
    streams: HashMap<String, String>,
    log: CallLog,
}

impl std::fmt::Debug for MockVideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockVideoSource").field("id", &self.id).finish()
    }
}

impl MockVideoSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            categories: Vec::new(),
            videos: Arc::new(RwLock::new(Vec::new())),
            episodes: HashMap::new(),
            streams: HashMap::new(),
            log: CallLog::default(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_videos(mut self, videos: Vec<Video>) -> Self {
        self.videos = Arc::new(RwLock::new(videos));
        self
    }

    pub fn with_episodes(mut self, video_id: &str, episodes: Vec<VideoEpisode>) -> Self {
        self.episodes.insert(video_id.to_string(), episodes);
        self
    }

    /// Stream URL `episode_detail` resolves `episode_id` to.
    pub fn with_stream(mut self, episode_id: &str, url: &str) -> Self {
        self.streams.insert(episode_id.to_string(), url.to_string());
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
}

#[async_trait]
impl VideoSource for MockVideoSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn categories(&self) -> Vec<Category> {
        self.log.record("categories", "").await;
        self.categories.clone()
    }

    async fn videos(&self, category: &str, paging: Paging) -> Listing<Video> {
        self.log.record("videos", category).await;
        let videos = self
            .videos
            .read()
            .await
            .iter()
            .filter(|v| v.tags.iter().any(|t| t == category))
            .cloned()
            .collect();
        Listing::from_all(videos, paging)
    }

    async fn detail(&self, video_id: &str) -> Result<Video, SourceError> {
        self.log.record("detail", video_id).await;
        self.log.check_failure(video_id).await?;
        self.videos
            .read()
            .await
            .iter()
            .find(|v| v.id == video_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(video_id.to_string()))
    }

    async fn episodes(&self, video_id: &str) -> Result<Vec<VideoEpisode>, SourceError> {
        self.log.record("episodes", video_id).await;
        self.log.check_failure(video_id).await?;
        self.episodes
            .get(video_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(video_id.to_string()))
    }

    async fn episode_detail(&self, episode_id: &str) -> Result<VideoEpisodeDetail, SourceError> {
        self.log.record("episode_detail", episode_id).await;
        self.log.check_failure(episode_id).await?;
        let episode = self
            .episodes
            .values()
            .flatten()
            .find(|e| e.id == episode_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(episode_id.to_string()))?;
        let stream = self.streams.get(episode_id).cloned().ok_or_else(|| {
            ResolveError::new(Stage::Parser, format!("no stream for {}", episode_id))
        })?;
        Ok(VideoEpisodeDetail::resolved(episode, stream))
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Video> {
        self.log.record("search", keyword).await;
        let videos = self
            .videos
            .read()
            .await
            .iter()
            .filter(|v| v.title.contains(keyword))
            .cloned()
            .collect();
        Listing::from_all(videos, paging)
    }
}
