//! Bulk e-book metadata warm-up.
//!
//! Walks every category of an e-book source page by page and keeps the
//! collected books in an in-memory table per source. At most one warm-up
//! runs at a time in the process; triggers arriving meanwhile only report
//! that a load is in progress.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::WarmupConfig;
use crate::content::{Book, Paging};
use crate::metrics::WARMUPS_TOTAL;
use crate::sources::EbookSource;

/// Clears the in-flight flag when the worker ends, even by panic.
struct LoadingGuard(Arc<AtomicBool>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataWarmer {
    config: WarmupConfig,
    loading: Arc<AtomicBool>,
    tables: Arc<RwLock<HashMap<String, Arc<Vec<Book>>>>>,
}

impl MetadataWarmer {
    pub fn new(config: WarmupConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Start a warm-up of `source` when its table is empty or `force_reload`.
    ///
    /// Returns whether a warm-up is in flight once the call returns.
    pub async fn trigger(
        &self,
        source: &str,
        adapter: Arc<dyn EbookSource>,
        force_reload: bool,
    ) -> bool {
        if self.is_loading() {
            return true;
        }
        let populated = self
            .tables
            .read()
            .await
            .get(source)
            .map(|t| !t.is_empty())
            .unwrap_or(false);
        if populated && !force_reload {
            return false;
        }
        if self
            .loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return true;
        }

        let guard = LoadingGuard(Arc::clone(&self.loading));
        let tables = Arc::clone(&self.tables);
        let config = self.config.clone();
        let source = source.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            let started = Instant::now();
            info!(source = %source, "Metadata warm-up started");

            let books = collect(adapter.as_ref(), &config).await;
            let count = books.len();
            tables.write().await.insert(source.clone(), Arc::new(books));

            WARMUPS_TOTAL.inc();
            info!(
                source = %source,
                books = count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Metadata warm-up finished"
            );
        });
        true
    }

    /// The collected books of `source`, empty before the first warm-up.
    pub async fn snapshot(&self, source: &str) -> Arc<Vec<Book>> {
        self.tables
            .read()
            .await
            .get(source)
            .cloned()
            .unwrap_or_default()
    }
}

/// Walk every category until it reports no more pages.
async fn collect(adapter: &dyn EbookSource, config: &WarmupConfig) -> Vec<Book> {
    let max_pages = config.max_pages_per_category.max(1);
    let mut books = Vec::new();
    let mut seen = HashSet::new();

    for category in adapter.categories().await {
        let mut pages = 0;
        for page in 1..=max_pages {
            let listing = adapter
                .books(&category.id, Paging::new(page, config.page_size.max(1)))
                .await;
            pages = page;
            if listing.items.is_empty() {
                break;
            }
            for mut book in listing.items {
                if !seen.insert(book.id.clone()) {
                    continue;
                }
                book.category = Some(category.id.clone());
                book.category_name = Some(category.name.clone());
                books.push(book);
            }
            if !listing.has_more {
                break;
            }
            if page == max_pages {
                warn!(
                    source = adapter.id(),
                    category = %category.id,
                    "Warm-up page limit reached"
                );
            }
        }
        debug!(source = adapter.id(), category = %category.id, pages, "Category walked");
    }
    books
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockEbookSource};
    use std::time::Duration;

    fn library() -> Arc<MockEbookSource> {
        let mut books: Vec<Book> = (1..=5)
            .map(|i| fixtures::book(&format!("f{}", i), &format!("Fantasy {}", i), "1"))
            .collect();
        books.push(fixtures::book("r1", "Romance 1", "2"));
        Arc::new(
            MockEbookSource::new("lib")
                .with_categories(fixtures::categories(&[("1", "Fantasy"), ("2", "Romance")]))
                .with_books(books),
        )
    }

    fn warmer(max_pages: u32, page_size: u32) -> MetadataWarmer {
        MetadataWarmer::new(WarmupConfig {
            max_pages_per_category: max_pages,
            page_size,
        })
    }

    async fn wait_idle(warmer: &MetadataWarmer) {
        for _ in 0..200 {
            if !warmer.is_loading() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("warm-up did not finish");
    }

    #[tokio::test]
    async fn test_trigger_collects_tagged_books() {
        let source = library();
        let warmer = warmer(10, 2);

        assert!(warmer.trigger("lib", source.clone(), false).await);
        wait_idle(&warmer).await;

        let table = warmer.snapshot("lib").await;
        assert_eq!(table.len(), 6);
        let romance = table.iter().find(|b| b.id == "r1").unwrap();
        assert_eq!(romance.category.as_deref(), Some("2"));
        assert_eq!(romance.category_name.as_deref(), Some("Romance"));
        // Fantasy: pages of 2, 2 and 1.
        assert_eq!(source.call_count("books").await, 4);
    }

    #[tokio::test]
    async fn test_populated_table_is_kept_unless_forced() {
        let source = library();
        let warmer = warmer(10, 20);
        warmer.trigger("lib", source.clone(), false).await;
        wait_idle(&warmer).await;

        assert!(!warmer.trigger("lib", source.clone(), false).await);
        assert_eq!(source.call_count("categories").await, 1);

        assert!(warmer.trigger("lib", source.clone(), true).await);
        wait_idle(&warmer).await;
        assert_eq!(source.call_count("categories").await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_reports_loading() {
        let source = library();
        let warmer = warmer(10, 20);
        warmer.loading.store(true, Ordering::SeqCst);

        assert!(warmer.trigger("lib", source.clone(), true).await);
        assert_eq!(source.call_count("categories").await, 0);
        assert!(warmer.snapshot("lib").await.is_empty());
    }

    #[tokio::test]
    async fn test_page_limit_bounds_walk() {
        let source = library();
        let warmer = warmer(1, 2);
        warmer.trigger("lib", source.clone(), false).await;
        wait_idle(&warmer).await;

        // Two fantasy books from the single page, plus the romance one.
        assert_eq!(warmer.snapshot("lib").await.len(), 3);
    }
}
