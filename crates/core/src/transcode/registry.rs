//! In-memory registry of transcode tasks.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{TaskStatus, TranscodeTask};

/// Tasks by id. Terminal tasks are kept until the process exits.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, TranscodeTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: TranscodeTask) {
        self.tasks.write().await.insert(task.task_id.clone(), task);
    }

    /// Insert `task` unless the same episode is already processing.
    ///
    /// Returns the running task in that case; check and insert happen under
    /// one lock so concurrent submits start a single job.
    pub async fn insert_unless_running(&self, task: TranscodeTask) -> Result<(), TranscodeTask> {
        let mut tasks = self.tasks.write().await;
        if let Some(running) = tasks.values().find(|t| {
            t.status == TaskStatus::Processing && t.is_for(&task.series_id, &task.episode_id)
        }) {
            return Err(running.clone());
        }
        tasks.insert(task.task_id.clone(), task);
        Ok(())
    }

    pub async fn get(&self, task_id: &str) -> Option<TranscodeTask> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn list(&self) -> Vec<TranscodeTask> {
        let mut tasks: Vec<_> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.started_at);
        tasks
    }

    /// Apply `f` to a running task.
    ///
    /// Returns false when the task is unknown or already terminal; terminal
    /// tasks are never changed.
    pub async fn update(&self, task_id: &str, f: impl FnOnce(&mut TranscodeTask)) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(task_id) {
            Some(task) if !task.status.is_terminal() => {
                f(task);
                true
            }
            Some(task) => {
                debug!(task_id, status = task.status.as_str(), "Ignoring update of finished task");
                false
            }
            None => false,
        }
    }

    pub async fn set_progress(&self, task_id: &str, progress: f64) -> bool {
        self.update(task_id, |task| task.progress = progress.clamp(0.0, 1.0))
            .await
    }

    pub async fn complete(&self, task_id: &str) -> bool {
        self.update(task_id, |task| {
            task.status = TaskStatus::Completed;
            task.progress = 1.0;
            task.finished_at = Some(Utc::now());
        })
        .await
    }

    pub async fn fail(&self, task_id: &str, error: impl Into<String>) -> bool {
        let error = error.into();
        self.update(task_id, |task| {
            task.status = TaskStatus::Failed;
            task.finished_at = Some(Utc::now());
            task.error = Some(error);
        })
        .await
    }

    /// Most recent task for an episode with the given status.
    pub async fn latest_for(
        &self,
        series_id: &str,
        episode_id: &str,
        status: TaskStatus,
    ) -> Option<TranscodeTask> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status && t.is_for(series_id, episode_id))
            .max_by_key(|t| t.started_at)
            .cloned()
    }

    pub async fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .count()
    }
}
