//! ffmpeg stderr progress parsing.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex_lite::Regex;

static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").unwrap());
static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s|out_)time=\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").unwrap());

const TAIL_LINES: usize = 20;

/// Parse `HH:MM:SS(.xx)` into seconds.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.trim().splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Tracks duration, progress and the recent stderr of one run.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    duration: Option<f64>,
    progress: f64,
    tail: VecDeque<String>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one stderr line; returns the new progress when it changed.
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if self.tail.len() == TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());

        if self.duration.is_none() {
            if let Some(caps) = DURATION.captures(line) {
                self.duration = parse_timestamp(&caps[1]).filter(|d| *d > 0.0);
                return None;
            }
        }

        let duration = self.duration?;
        let time = parse_timestamp(&TIME.captures(line)?[1])?;
        let progress = (time / duration).clamp(0.0, 1.0);
        if progress > self.progress {
            self.progress = progress;
            Some(progress)
        } else {
            None
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Last stderr lines, oldest first.
    pub fn tail(&self) -> String {
        self.tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STDERR: &str = include_str!("../../tests/fixtures/ffmpeg_stderr.txt");

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:00:10.00"), Some(10.0));
        assert_eq!(parse_timestamp("01:02:03.5"), Some(3723.5));
        assert_eq!(parse_timestamp("N/A"), None);
    }

    #[test]
    fn test_fixture_progress() {
        let mut tracker = ProgressTracker::new();
        let updates: Vec<f64> = STDERR
            .split(['\n', '\r'])
            .filter_map(|line| tracker.feed(line))
            .collect();
        assert_eq!(tracker.duration(), Some(10.0));
        assert_eq!(updates, vec![0.5, 1.0]);
        assert_eq!(tracker.progress(), 1.0);
    }

    #[test]
    fn test_time_before_duration_is_ignored() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.feed("size= 1kB time=00:00:05.00 bitrate=1"), None);
        assert_eq!(tracker.progress(), 0.0);
    }

    #[test]
    fn test_progress_is_capped() {
        let mut tracker = ProgressTracker::new();
        tracker.feed("  Duration: 00:00:04.00, start: 0.000000, bitrate: N/A");
        assert_eq!(tracker.feed("out_time=00:00:06.000000"), Some(1.0));
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut tracker = ProgressTracker::new();
        for i in 0..50 {
            tracker.feed(&format!("line {}", i));
        }
        let tail = tracker.tail();
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }
}
