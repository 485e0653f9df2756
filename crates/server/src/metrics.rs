//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the gateway:
//! - HTTP request metrics (latency, counts, in flight)
//! - Transcode task and warm-up status (collected dynamically)
//! - Everything exported by `mediahub_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use mediahub_core::transcode::TaskStatus;
use mediahub_core::Domain;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediahub_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediahub_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediahub_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Background Job Metrics (collected dynamically)
// =============================================================================

/// Transcode tasks held by the registry, by status.
pub static TRANSCODE_TASKS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "mediahub_transcode_tasks",
            "Transcode tasks in the registry by status",
        ),
        &["status"],
    )
    .unwrap()
});

/// Whether a metadata warm-up is running (1) or idle (0).
pub static WARMUP_LOADING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediahub_metadata_warmup_loading",
        "Whether a metadata warm-up is in flight",
    )
    .unwrap()
});

// =============================================================================
// Source Metrics (collected dynamically)
// =============================================================================

/// Enabled sources by domain.
pub static SOURCES_ENABLED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("mediahub_sources_enabled", "Enabled sources by domain"),
        &["domain"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Jobs
    registry
        .register(Box::new(TRANSCODE_TASKS.clone()))
        .unwrap();
    registry.register(Box::new(WARMUP_LOADING.clone())).unwrap();

    // Sources
    registry
        .register(Box::new(SOURCES_ENABLED.clone()))
        .unwrap();

    // Core metrics (fetch layer, resolver, cache, transcoder)
    for metric in mediahub_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current values
/// from the transcode registry, the warm-up worker and the source factories.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let registry = state.transcoder().registry();
    for status in [
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ] {
        let count = registry.count_by_status(status).await;
        TRANSCODE_TASKS
            .with_label_values(&[status.as_str()])
            .set(count as i64);
    }

    WARMUP_LOADING.set(if state.warmer().is_loading() { 1 } else { 0 });

    for domain in [Domain::Comic, Domain::Ebook, Domain::Podcast, Domain::Video] {
        let enabled = state
            .sources()
            .list(Some(domain))
            .iter()
            .filter(|meta| meta.enabled)
            .count();
        SOURCES_ENABLED
            .with_label_values(&[domain.as_str()])
            .set(enabled as i64);
    }
}

/// Path segments kept verbatim in metric labels; anything else is an id.
const ROUTE_SEGMENTS: &[&str] = &[
    "health",
    "sources",
    "metrics",
    "comics",
    "chapters",
    "images",
    "ebooks",
    "podcasts",
    "episodes",
    "videos",
    "categories",
    "category",
    "hot",
    "latest",
    "search",
    "metadata",
    "convert",
    "status",
    "download",
    "proxy",
    "image",
    "video",
];

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.is_empty() || ROUTE_SEGMENTS.contains(&segment) {
                segment.to_string()
            } else {
                "{id}".to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_ids() {
        assert_eq!(normalize_path("/comics/12345"), "/comics/{id}");
        assert_eq!(
            normalize_path("/chapters/abc_12/images/3"),
            "/chapters/{id}/images/{id}"
        );
        assert_eq!(
            normalize_path("/videos/episodes/9001_1_2"),
            "/videos/episodes/{id}"
        );
    }

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/videos/convert/status/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/videos/convert/status/{id}");
    }

    #[test]
    fn test_normalize_path_download() {
        assert_eq!(
            normalize_path("/videos/download/9001/9001_1_2.mp4"),
            "/videos/download/{id}/{id}"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/podcasts/hot"), "/podcasts/hot");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("mediahub_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_all_metrics() {
        // Prometheus only outputs metrics that have been accessed
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        TRANSCODE_TASKS.with_label_values(&["processing"]).set(0);
        WARMUP_LOADING.set(0);
        SOURCES_ENABLED.with_label_values(&["comic"]).set(2);
        mediahub_core::metrics::WARMUPS_TOTAL.inc_by(0);
        mediahub_core::metrics::CACHE_ENTRIES.set(0);

        let output = encode_metrics();

        assert!(output.contains("mediahub_http_request_duration_seconds"));
        assert!(output.contains("mediahub_http_requests_in_flight"));
        assert!(output.contains("mediahub_transcode_tasks"));
        assert!(output.contains("mediahub_metadata_warmup_loading"));
        assert!(output.contains("mediahub_sources_enabled"));
        assert!(output.contains("mediahub_metadata_warmups_total"));
        assert!(output.contains("mediahub_cache_entries"));
    }
}
