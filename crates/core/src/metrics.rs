//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Upstream fetches (per source, per outcome)
//! - Media resolver stage failures
//! - Response cache lookups
//! - Transcode jobs and metadata warm-ups

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Fetch Layer Metrics
// =============================================================================

/// Upstream requests total by source and outcome.
pub static UPSTREAM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediahub_upstream_requests_total",
            "Total requests issued to upstream sites",
        ),
        &["source", "outcome"], // "ok", "status", "transport"
    )
    .unwrap()
});

/// Upstream request duration in seconds.
pub static UPSTREAM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediahub_upstream_request_duration_seconds",
            "Duration of upstream requests, pacing delay excluded",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Resolver Metrics
// =============================================================================

/// Resolver failures by stage.
pub static RESOLVER_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediahub_resolver_failures_total",
            "Media resolution failures by pipeline stage",
        ),
        &["stage"],
    )
    .unwrap()
});

/// Pages fetched by concurrent gathers.
pub static GATHER_PAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediahub_gather_pages_total",
            "Per-page fetches issued by concurrent image gathers",
        ),
        &["result"], // "ok", "failed"
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics
// =============================================================================

/// Cache lookups by result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediahub_cache_lookups_total", "Response cache lookups"),
        &["result"], // "hit", "miss", "expired", "disabled"
    )
    .unwrap()
});

/// Live cache entries.
pub static CACHE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("mediahub_cache_entries", "Entries held by the response cache").unwrap()
});

// =============================================================================
// Background Job Metrics
// =============================================================================

/// Transcodes by result.
pub static TRANSCODES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediahub_transcodes_total", "Total HLS to MP4 transcodes"),
        &["result"], // "completed", "failed", "tool_missing"
    )
    .unwrap()
});

/// Transcode duration in seconds.
pub static TRANSCODE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediahub_transcode_duration_seconds",
            "Duration of HLS to MP4 transcodes",
        )
        .buckets(vec![
            5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0,
        ]),
        &["result"],
    )
    .unwrap()
});

/// Transcodes currently running.
pub static TRANSCODES_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediahub_transcodes_active",
        "Number of transcodes currently running",
    )
    .unwrap()
});

/// Metadata warm-ups completed.
pub static WARMUPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediahub_metadata_warmups_total",
        "Total metadata warm-up runs completed",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Fetch
        Box::new(UPSTREAM_REQUESTS.clone()),
        Box::new(UPSTREAM_DURATION.clone()),
        // Resolver
        Box::new(RESOLVER_FAILURES.clone()),
        Box::new(GATHER_PAGES.clone()),
        // Cache
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(CACHE_ENTRIES.clone()),
        // Jobs
        Box::new(TRANSCODES_TOTAL.clone()),
        Box::new(TRANSCODE_DURATION.clone()),
        Box::new(TRANSCODES_ACTIVE.clone()),
        Box::new(WARMUPS_TOTAL.clone()),
    ]
}
