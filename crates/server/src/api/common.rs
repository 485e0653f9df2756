//! Response shapes and cache plumbing shared by the domain handlers.

use std::convert::Infallible;
use std::future::Future;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use mediahub_core::{CacheKey, Category, Listing, Paging, ResponseCache, SourceError, TtlClass};

use super::error::ApiError;

/// Envelope for unpaged collections (categories, chapters, episodes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}

/// Start a cache key for `handler` of `domain` served by `source`.
///
/// `path` is the resource path without its query string; the chapter image
/// routes share the set's path so single pages come from the cached set.
pub fn key(domain: &str, handler: &str, path: &str, source: &str) -> CacheKey {
    CacheKey::new(domain)
        .handler(handler)
        .path(path)
        .arg("source", source)
}

/// Add paging to a key.
pub fn paged(key: CacheKey, paging: Paging) -> CacheKey {
    key.query("page", &paging.page).query("limit", &paging.limit)
}

/// Serve a listing through the cache.
///
/// Adapters answer upstream failures with an empty listing, so empty
/// listings are never stored.
pub async fn listing<T, Fut>(
    cache: &ResponseCache,
    key: CacheKey,
    class: TtlClass,
    fetch: Fut,
) -> Listing<T>
where
    T: Serialize + DeserializeOwned,
    Fut: Future<Output = Listing<T>>,
{
    let Ok(listing) = cache
        .cached_if(
            &key.build(),
            class,
            |listing: &Listing<T>| !listing.items.is_empty(),
            || async move { Ok::<_, Infallible>(fetch.await) },
        )
        .await;
    listing
}

/// Serve a category list through the cache, skipping empty answers.
pub async fn categories<Fut>(cache: &ResponseCache, key: CacheKey, fetch: Fut) -> Collection<Category>
where
    Fut: Future<Output = Vec<Category>>,
{
    let Ok(items) = cache
        .cached_if(
            &key.build(),
            TtlClass::Detail,
            |items: &Vec<Category>| !items.is_empty(),
            || async move { Ok::<_, Infallible>(fetch.await) },
        )
        .await;
    Collection::from(items)
}

/// Serve a fallible adapter call through the cache.
pub async fn detail<T, Fut>(
    cache: &ResponseCache,
    key: CacheKey,
    class: TtlClass,
    source: &str,
    fetch: Fut,
) -> Result<T, ApiError>
where
    T: Serialize + DeserializeOwned,
    Fut: Future<Output = Result<T, SourceError>>,
{
    cache
        .cached(&key.build(), class, || fetch)
        .await
        .map_err(|e| ApiError::source(source, e))
}

/// Like [`detail`], storing only results accepted by `keep`.
pub async fn detail_if<T, Fut>(
    cache: &ResponseCache,
    key: CacheKey,
    class: TtlClass,
    source: &str,
    keep: impl FnOnce(&T) -> bool,
    fetch: Fut,
) -> Result<T, ApiError>
where
    T: Serialize + DeserializeOwned,
    Fut: Future<Output = Result<T, SourceError>>,
{
    cache
        .cached_if(&key.build(), class, keep, || fetch)
        .await
        .map_err(|e| ApiError::source(source, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_includes_path() {
        let hot = key("comics", "list", "/comics/hot", "dm5").build();
        let latest = key("comics", "list", "/comics/latest", "dm5").build();
        assert_ne!(hot, latest);

        let again = key("comics", "list", "/comics/hot", "dm5").build();
        assert_eq!(hot, again);
        assert!(key("comics", "list", "/comics/hot", "dm5")
            .canonical()
            .contains("\"path\":\"/comics/hot\""));
    }

    #[test]
    fn test_paged_keys_differ_by_page() {
        let base = || key("videos", "search", "/videos/search", "maccms");
        let first = paged(base(), Paging { page: 1, limit: 20 }).build();
        let second = paged(base(), Paging { page: 2, limit: 20 }).build();
        assert_ne!(first, second);
    }
}
