//! Bounded concurrent per-page fetches.

use std::future::Future;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::GATHER_PAGES;

/// Upper bound on in-flight page fetches.
pub const MAX_CONCURRENCY: usize = 10;

/// The gather was cancelled; partial results are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("page gather cancelled")]
pub struct Cancelled;

/// Fetch `pages` with at most `concurrency` requests in flight.
///
/// Returns the successful pages sorted by page number. Failed pages are
/// dropped; callers decide how to treat gaps. The token is checked before
/// every completion and cancellation drops all in-flight fetches.
pub async fn gather_pages<T, F, Fut>(
    pages: Vec<usize>,
    concurrency: usize,
    cancel: &CancellationToken,
    fetch: F,
) -> Result<Vec<(usize, T)>, Cancelled>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
    let total = pages.len();
    let fetch = &fetch;
    let mut in_flight = stream::iter(pages.into_iter().map(|page| async move {
        (page, fetch(page).await)
    }))
    .buffer_unordered(concurrency);

    let mut results = Vec::with_capacity(total);
    let mut completed = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(completed, total, "Page gather cancelled");
                return Err(Cancelled);
            }
            next = in_flight.next() => next,
        };
        let Some((page, result)) = next else {
            break;
        };

        completed += 1;
        match result {
            Some(value) => {
                GATHER_PAGES.with_label_values(&["ok"]).inc();
                results.push((page, value));
            }
            None => {
                GATHER_PAGES.with_label_values(&["failed"]).inc();
                debug!(page, "Page fetch failed");
            }
        }
        if completed % concurrency == 0 || completed == total {
            debug!(completed, total, ok = results.len(), "Page gather progress");
        }
    }

    results.sort_by_key(|(page, _)| *page);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_sorted_by_page() {
        let cancel = CancellationToken::new();
        let pages: Vec<usize> = (1..=12).collect();
        let result = gather_pages(pages, 4, &cancel, |page| async move {
            // Later pages finish first.
            tokio::time::sleep(Duration::from_millis((13 - page as u64) * 2)).await;
            Some(page * 10)
        })
        .await
        .unwrap();

        let order: Vec<usize> = result.iter().map(|(p, _)| *p).collect();
        assert_eq!(order, (1..=12).collect::<Vec<_>>());
        assert_eq!(result[0].1, 10);
    }

    #[tokio::test]
    async fn test_failed_pages_are_dropped() {
        let cancel = CancellationToken::new();
        let result = gather_pages(vec![1, 2, 3, 4], 2, &cancel, |page| async move {
            (page != 3).then_some(page)
        })
        .await
        .unwrap();
        assert_eq!(
            result.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let cancel = CancellationToken::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pages: Vec<usize> = (1..=40).collect();

        gather_pages(pages, 50, &cancel, |page| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Some(page)
            }
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= MAX_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_cancel_after_ten_completions() {
        let cancel = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let pages: Vec<usize> = (1..=30).collect();

        let result = gather_pages(pages, 10, &cancel, |page| {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            let cancel = cancel.clone();
            started.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(5 + (page as u64 % 7))).await;
                if finished.fetch_add(1, Ordering::SeqCst) + 1 == 10 {
                    cancel.cancel();
                }
                Some(page)
            }
        })
        .await;

        assert_eq!(result, Err(Cancelled));
        assert!(started.load(Ordering::SeqCst) <= 20);
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);
        let result = gather_pages(vec![1, 2, 3], 3, &cancel, |page| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Some(page) }
        })
        .await;
        assert_eq!(result, Err(Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
