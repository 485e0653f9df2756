//! HLS to MP4 transcoding.
//!
//! `TranscodeService` runs `ffmpeg` as a detached worker per request and keeps
//! the state of every job in a `TaskRegistry` that clients poll.
//!
//! ```ignore
//! let service = TranscodeService::new(config.transcoder.clone());
//! let task = service.submit(TranscodeRequest {
//!     m3u8_url: "https://cdn.example/v/index.m3u8".into(),
//!     episode_id: "12_1_3".into(),
//!     series_id: "12".into(),
//!     source: "maccms".into(),
//! }).await?;
//!
//! let status = service.status(&task.task_id).await;
//! ```

mod error;
mod ffmpeg;
mod progress;
mod registry;
mod types;

pub use error::TranscodeError;
pub use ffmpeg::TranscodeService;
pub use progress::{parse_timestamp, ProgressTracker};
pub use registry::TaskRegistry;
pub use types::{output_path, sanitize_component, TaskStatus, TranscodeRequest, TranscodeTask};
