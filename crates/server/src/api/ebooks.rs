//! E-book API handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    Json,
};
use serde::{Deserialize, Serialize};

use mediahub_core::{
    Book, BookChapter, BookChapterContent, BookDetail, Category, Listing, TtlClass,
};

use super::common::{self, Collection};
use super::error::ApiError;
use super::extract::{Path, Query};
use super::params::{CategoryQuery, SearchQuery, SourceQuery};
use crate::state::AppState;

const DOMAIN: &str = "ebooks";

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct MetadataQuery {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub force_reload: bool,
    #[serde(default)]
    pub keyword: Option<String>,
}

impl MetadataQuery {
    fn source(&self) -> Option<&str> {
        self.source.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub is_loading: bool,
    pub total: usize,
    pub items: Vec<Book>,
}

fn matches_keyword(book: &Book, keyword: &str) -> bool {
    let keyword = keyword.to_lowercase();
    book.title.to_lowercase().contains(&keyword) || book.author.to_lowercase().contains(&keyword)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /ebooks/categories
pub async fn categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Collection<Category>>, ApiError> {
    let source = state.sources().ebooks.get(query.source()).await?;
    let key = common::key(DOMAIN, "categories", "/ebooks/categories", source.id());
    Ok(Json(
        common::categories(state.cache(), key, source.categories()).await,
    ))
}

/// GET /ebooks/category?category=
pub async fn by_category(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Listing<Book>>, ApiError> {
    let paging = query.paging()?;
    let category = query.category()?;
    let source = state.sources().ebooks.get(query.source()).await?;
    let key = common::paged(
        common::key(DOMAIN, "category", "/ebooks/category", source.id()),
        paging,
    )
    .query("category", category);
    Ok(Json(
        common::listing(
            state.cache(),
            key,
            TtlClass::List,
            source.books(category, paging),
        )
        .await,
    ))
}

/// GET /ebooks/search?keyword=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Listing<Book>>, ApiError> {
    let paging = query.paging()?;
    let source = state.sources().ebooks.get(query.source()).await?;
    let Some(keyword) = query.keyword() else {
        return Ok(Json(Listing::empty(paging)));
    };
    let key = common::paged(common::key(DOMAIN, "search", "/ebooks/search", source.id()), paging)
        .query("keyword", keyword);
    Ok(Json(
        common::listing(
            state.cache(),
            key,
            TtlClass::List,
            source.search(keyword, paging),
        )
        .await,
    ))
}

/// GET /ebooks/metadata
///
/// Returns the warm-up table of the source, starting a warm-up when the
/// table is empty or `force_reload` is set. Never cached.
pub async fn metadata(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetadataQuery>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let source = state.sources().ebooks.get(query.source()).await?;
    let source_id = source.id().to_string();

    let is_loading = state
        .warmer()
        .trigger(&source_id, source, query.force_reload)
        .await;
    let table = state.warmer().snapshot(&source_id).await;

    let keyword = query.keyword.as_deref().map(str::trim).unwrap_or("");
    let items: Vec<Book> = if keyword.is_empty() {
        table.as_ref().clone()
    } else {
        table
            .iter()
            .filter(|book| matches_keyword(book, keyword))
            .cloned()
            .collect()
    };

    Ok(Json(MetadataResponse {
        is_loading,
        total: items.len(),
        items,
    }))
}

/// GET /ebooks/{id}
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<BookDetail>, ApiError> {
    let source = state.sources().ebooks.get(query.source()).await?;
    let key = common::key(DOMAIN, "detail", &format!("/ebooks/{}", id), source.id()).arg("id", &id);
    let book = common::detail(
        state.cache(),
        key,
        TtlClass::Detail,
        source.id(),
        source.detail(&id),
    )
    .await?;
    Ok(Json(book))
}

/// GET /ebooks/{id}/chapters
pub async fn chapters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Collection<BookChapter>>, ApiError> {
    let source = state.sources().ebooks.get(query.source()).await?;
    let key = common::key(DOMAIN, "chapters", &format!("/ebooks/{}/chapters", id), source.id())
        .arg("id", &id);
    let chapters = common::detail(
        state.cache(),
        key,
        TtlClass::Detail,
        source.id(),
        source.chapters(&id),
    )
    .await?;
    Ok(Json(Collection::from(chapters)))
}

/// GET /ebooks/chapters/{id}
pub async fn chapter_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<BookChapterContent>, ApiError> {
    let source = state.sources().ebooks.get(query.source()).await?;
    let key = common::key(DOMAIN, "content", &format!("/ebooks/chapters/{}", id), source.id())
        .arg("id", &id);
    let content = common::detail(
        state.cache(),
        key,
        TtlClass::Content,
        source.id(),
        source.chapter_content(&id),
    )
    .await?;
    Ok(Json(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediahub_core::testing::fixtures;

    #[test]
    fn test_matches_keyword_title_or_author() {
        let mut book = fixtures::book("b1", "The Long Road", "fantasy");
        book.author = "Li Bai".to_string();
        assert!(matches_keyword(&book, "long"));
        assert!(matches_keyword(&book, "LI BAI"));
        assert!(!matches_keyword(&book, "ocean"));
    }
}
