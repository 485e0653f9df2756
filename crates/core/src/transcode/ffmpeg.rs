//! ffmpeg-backed transcode service.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::config::TranscoderConfig;
use crate::metrics::{TRANSCODES_ACTIVE, TRANSCODES_TOTAL, TRANSCODE_DURATION};

use super::error::TranscodeError;
use super::progress::ProgressTracker;
use super::registry::TaskRegistry;
use super::types::{TaskStatus, TranscodeRequest, TranscodeTask};

/// Submits transcodes and owns the registry they report to.
#[derive(Debug, Clone)]
pub struct TranscodeService {
    config: TranscoderConfig,
    registry: Arc<TaskRegistry>,
}

impl TranscodeService {
    pub fn new(config: TranscoderConfig) -> Self {
        Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
        }
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Builds ffmpeg arguments for a remux of `input` into `output`.
    fn build_args(input: &str, output: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-bsf:a".to_string(),
            "aac_adtstoasc".to_string(),
            // Progress output for parsing
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    /// Check that the transcoder binary runs.
    pub async fn probe(&self) -> Result<(), TranscodeError> {
        let status = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| spawn_error(&self.config.ffmpeg_path, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(TranscodeError::ToolMissing {
                path: self.config.ffmpeg_path.clone(),
            })
        }
    }

    /// Register a task and start its worker.
    ///
    /// A missing binary still records a failed task so the failure can be
    /// polled like any other. Submitting an episode that is already
    /// processing returns the running task instead of starting a second job.
    pub async fn submit(&self, request: TranscodeRequest) -> Result<TranscodeTask, TranscodeError> {
        validate_request(&request)?;
        let task = TranscodeTask::new(&request, &self.config.output_dir);

        if let Err(e) = self.probe().await {
            warn!(error = %e, "Transcoder unavailable");
            TRANSCODES_TOTAL.with_label_values(&["tool_missing"]).inc();
            let task_id = task.task_id.clone();
            self.registry.insert(task).await;
            self.registry.fail(&task_id, e.task_message()).await;
            return Err(e);
        }

        if let Err(running) = self.registry.insert_unless_running(task.clone()).await {
            debug!(
                task_id = %running.task_id,
                episode_id = %running.episode_id,
                "Episode already converting"
            );
            return Ok(running);
        }

        let output = task.output_path.clone();
        if let Some(parent) = output.parent() {
            if tokio::fs::create_dir_all(parent).await.is_err() {
                let e = TranscodeError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                };
                self.registry.fail(&task.task_id, e.task_message()).await;
                return Err(e);
            }
        }

        info!(
            task_id = %task.task_id,
            source = %task.source,
            series_id = %task.series_id,
            episode_id = %task.episode_id,
            "Transcode started"
        );

        let worker = Worker {
            ffmpeg_path: self.config.ffmpeg_path.clone(),
            args: Self::build_args(&request.m3u8_url, &output),
            timeout_secs: self.config.timeout_secs,
            registry: Arc::clone(&self.registry),
            task_id: task.task_id.clone(),
            output,
        };
        tokio::spawn(worker.run());

        Ok(task)
    }

    pub async fn status(&self, task_id: &str) -> Result<TranscodeTask, TranscodeError> {
        self.registry
            .get(task_id)
            .await
            .ok_or_else(|| TranscodeError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Output of the latest completed task for an episode, if still on disk.
    ///
    /// Only paths recorded by a completed task are served; a file still being
    /// written is reported as not ready.
    pub async fn finished_output(
        &self,
        series_id: &str,
        episode_id: &str,
    ) -> Result<PathBuf, TranscodeError> {
        if let Some(task) = self
            .registry
            .latest_for(series_id, episode_id, TaskStatus::Completed)
            .await
        {
            if let Ok(meta) = tokio::fs::metadata(&task.output_path).await {
                if meta.is_file() {
                    return Ok(task.output_path);
                }
            }
        }
        if let Some(task) = self
            .registry
            .latest_for(series_id, episode_id, TaskStatus::Processing)
            .await
        {
            return Err(TranscodeError::NotReady {
                task_id: task.task_id,
            });
        }
        Err(TranscodeError::OutputNotFound {
            series_id: series_id.to_string(),
            episode_id: episode_id.to_string(),
        })
    }

    /// Delete a downloaded file after the grace period, then its directory
    /// if that left it empty.
    pub fn schedule_cleanup(&self, path: PathBuf) -> JoinHandle<()> {
        let grace = Duration::from_millis(self.config.cleanup_grace_ms);
        let root = self.config.output_dir.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed downloaded file"),
                Err(e) => debug!(path = %path.display(), error = %e, "Downloaded file already gone"),
            }
            if let Some(dir) = path.parent().filter(|d| *d != root) {
                // Fails while other episodes remain, which is fine.
                let _ = tokio::fs::remove_dir(dir).await;
            }
        })
    }
}

fn validate_request(request: &TranscodeRequest) -> Result<(), TranscodeError> {
    let url = request.m3u8_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(TranscodeError::invalid_request("m3u8_url must be http(s)"));
    }
    if request.series_id.trim().is_empty() || request.episode_id.trim().is_empty() {
        return Err(TranscodeError::invalid_request(
            "series_id and episode_id are required",
        ));
    }
    Ok(())
}

fn spawn_error(path: &Path, e: std::io::Error) -> TranscodeError {
    match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            TranscodeError::ToolMissing {
                path: path.to_path_buf(),
            }
        }
        _ => TranscodeError::Io(e),
    }
}

/// Read ffmpeg stderr and push progress into the registry.
pub(crate) async fn follow_stderr<R: AsyncRead + Unpin>(
    stderr: R,
    registry: &TaskRegistry,
    task_id: &str,
) -> ProgressTracker {
    let mut reader = BufReader::new(stderr);
    let mut tracker = ProgressTracker::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        // Stats lines are separated by carriage returns.
        for line in String::from_utf8_lossy(&buf).split(['\r', '\n']) {
            if let Some(progress) = tracker.feed(line) {
                registry.set_progress(task_id, progress).await;
            }
        }
    }
    tracker
}

struct Worker {
    ffmpeg_path: PathBuf,
    args: Vec<String>,
    timeout_secs: u64,
    registry: Arc<TaskRegistry>,
    task_id: String,
    output: PathBuf,
}

impl Worker {
    async fn run(self) {
        let start = Instant::now();
        TRANSCODES_ACTIVE.inc();
        let result = self.execute().await;
        TRANSCODES_ACTIVE.dec();
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(()) => {
                self.registry.complete(&self.task_id).await;
                TRANSCODES_TOTAL.with_label_values(&["completed"]).inc();
                TRANSCODE_DURATION
                    .with_label_values(&["completed"])
                    .observe(elapsed);
                info!(task_id = %self.task_id, elapsed_secs = elapsed, "Transcode completed");
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&self.output).await;
                self.registry.fail(&self.task_id, e.task_message()).await;
                TRANSCODES_TOTAL.with_label_values(&["failed"]).inc();
                TRANSCODE_DURATION
                    .with_label_values(&["failed"])
                    .observe(elapsed);
                warn!(task_id = %self.task_id, error = %e, "Transcode failed");
            }
        }
    }

    async fn execute(&self) -> Result<(), TranscodeError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.ffmpeg_path, e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TranscodeError::Io(std::io::Error::other("stderr not captured")))?;

        let result = timeout(Duration::from_secs(self.timeout_secs), async {
            let tracker = follow_stderr(stderr, &self.registry, &self.task_id).await;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, tracker))
        })
        .await;

        match result {
            Ok(Ok((status, _))) if status.success() => {
                // ffmpeg may exit 0 without writing anything for an empty playlist.
                match tokio::fs::metadata(&self.output).await {
                    Ok(meta) if meta.len() > 0 => Ok(()),
                    _ => Err(TranscodeError::Failed {
                        reason: "output file not created".to_string(),
                        stderr: None,
                    }),
                }
            }
            Ok(Ok((status, tracker))) => Err(TranscodeError::Failed {
                reason: format!("ffmpeg exited with code: {:?}", status.code()),
                stderr: Some(tracker.tail()),
            }),
            Ok(Err(e)) => Err(TranscodeError::Io(e)),
            Err(_) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                Err(TranscodeError::Timeout {
                    timeout_secs: self.timeout_secs,
                })
            }
        }
    }
}
