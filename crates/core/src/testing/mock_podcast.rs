//! Mock podcast source for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::content::{Category, Episode, EpisodeDetail, Listing, Paging, Program};
use crate::sources::{PodcastSource, SourceError};

use super::{CallLog, MockFailure, RecordedCall};

/// Mock implementation of [`PodcastSource`].
///
/// Every category lists all programs; `latest` lists them newest-first,
/// i.e. in reverse insertion order.
pub struct MockPodcastSource {
    id: String,
    categories: Vec<Category>,
    programs: Arc<RwLock<Vec<Program>>>,
    episodes: HashMap<String, Vec<Episode>>,
    details: HashMap<String, EpisodeDetail>,
    log: CallLog,
}

impl std::fmt::Debug for MockPodcastSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPodcastSource").field("id", &self.id).finish()
    }
}

impl MockPodcastSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            categories: Vec::new(),
            programs: Arc::new(RwLock::new(Vec::new())),
            episodes: HashMap::new(),
            details: HashMap::new(),
            log: CallLog::default(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_programs(mut self, programs: Vec<Program>) -> Self {
        self.programs = Arc::new(RwLock::new(programs));
        self
    }

    pub fn with_episodes(mut self, program_id: &str, episodes: Vec<Episode>) -> Self {
        self.episodes.insert(program_id.to_string(), episodes);
        self
    }

    pub fn with_episode_detail(mut self, detail: EpisodeDetail) -> Self {
        self.details.insert(detail.id.clone(), detail);
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

    async fn all(&self, paging: Paging) -> Listing<Program> {
        Listing::from_all(self.programs.read().await.clone(), paging)
    }
}

#[async_trait]
impl PodcastSource for MockPodcastSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn categories(&self) -> Vec<Category> {
        self.log.record("categories", "").await;
        self.categories.clone()
    }

    async fn programs(&self, category: &str, paging: Paging) -> Listing<Program> {
        self.log.record("programs", category).await;
        self.all(paging).await
    }

    async fn hot(&self, paging: Paging) -> Listing<Program> {
        self.log.record("hot", &paging.page.to_string()).await;
        self.all(paging).await
    }

    async fn latest(&self, paging: Paging) -> Listing<Program> {
        self.log.record("latest", &paging.page.to_string()).await;
        let mut programs = self.programs.read().await.clone();
        programs.reverse();
        Listing::from_all(programs, paging)
    }

    async fn detail(&self, program_id: &str) -> Result<Program, SourceError> {
        self.log.record("detail", program_id).await;
        self.log.check_failure(program_id).await?;
        self.programs
            .read()
            .await
            .iter()
            .find(|p| p.id == program_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(program_id.to_string()))
    }

    async fn episodes(&self, program_id: &str) -> Result<Vec<Episode>, SourceError> {
        self.log.record("episodes", program_id).await;
        self.log.check_failure(program_id).await?;
        self.episodes
            .get(program_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(program_id.to_string()))
    }

    async fn episode_detail(&self, episode_id: &str) -> Result<EpisodeDetail, SourceError> {
        self.log.record("episode_detail", episode_id).await;
        self.log.check_failure(episode_id).await?;
        self.details
            .get(episode_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(episode_id.to_string()))
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Program> {
        self.log.record("search", keyword).await;
        let programs = self
            .programs
            .read()
            .await
            .iter()
            .filter(|p| p.title.contains(keyword))
            .cloned()
            .collect();
        Listing::from_all(programs, paging)
    }
}
