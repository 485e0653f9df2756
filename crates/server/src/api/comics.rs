//! Comic API handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    Json,
};
use tokio_util::sync::CancellationToken;

use mediahub_core::{
    Category, Comic, ComicChapter, ComicImage, ImageSet, Listing, TtlClass,
};

use super::common::{self, Collection};
use super::error::ApiError;
use super::extract::{Path, Query};
use super::params::{CategoryQuery, PageQuery, SearchQuery, SourceQuery};
use crate::state::AppState;

const DOMAIN: &str = "comics";

/// GET /comics/categories
pub async fn categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Collection<Category>>, ApiError> {
    let source = state.sources().comics.get(query.source()).await?;
    let key = common::key(DOMAIN, "categories", "/comics/categories", source.id());
    Ok(Json(
        common::categories(state.cache(), key, source.categories()).await,
    ))
}

/// GET /comics/hot
pub async fn hot(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Listing<Comic>>, ApiError> {
    let paging = query.paging()?;
    let source = state.sources().comics.get(query.source()).await?;
    let key = common::paged(common::key(DOMAIN, "hot", "/comics/hot", source.id()), paging);
    Ok(Json(
        common::listing(state.cache(), key, TtlClass::Hot, source.hot(paging)).await,
    ))
}

/// GET /comics/latest
pub async fn latest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Listing<Comic>>, ApiError> {
    let paging = query.paging()?;
    let source = state.sources().comics.get(query.source()).await?;
    let key = common::paged(common::key(DOMAIN, "latest", "/comics/latest", source.id()), paging);
    Ok(Json(
        common::listing(state.cache(), key, TtlClass::List, source.latest(paging)).await,
    ))
}

/// GET /comics/category?category=
pub async fn by_category(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Listing<Comic>>, ApiError> {
    let paging = query.paging()?;
    let category = query.category()?;
    let source = state.sources().comics.get(query.source()).await?;
    let key = common::paged(
        common::key(DOMAIN, "category", "/comics/category", source.id()),
        paging,
    )
    .query("category", category);
    Ok(Json(
        common::listing(
            state.cache(),
            key,
            TtlClass::List,
            source.by_category(category, paging),
        )
        .await,
    ))
}

/// GET /comics/search?keyword=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Listing<Comic>>, ApiError> {
    let paging = query.paging()?;
    let source = state.sources().comics.get(query.source()).await?;
    let Some(keyword) = query.keyword() else {
        return Ok(Json(Listing::empty(paging)));
    };
    let key = common::paged(common::key(DOMAIN, "search", "/comics/search", source.id()), paging)
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

/// GET /comics/{id}
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Comic>, ApiError> {
    let source = state.sources().comics.get(query.source()).await?;
    let key = common::key(DOMAIN, "detail", &format!("/comics/{}", id), source.id()).arg("id", &id);
    let comic = common::detail(
        state.cache(),
        key,
        TtlClass::Detail,
        source.id(),
        source.detail(&id),
    )
    .await?;
    Ok(Json(comic))
}

/// GET /comics/{id}/chapters
pub async fn chapters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Collection<ComicChapter>>, ApiError> {
    let source = state.sources().comics.get(query.source()).await?;
    let key = common::key(DOMAIN, "chapters", &format!("/comics/{}/chapters", id), source.id())
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

/// Image set of a chapter, cached only when every page resolved.
///
/// Dropping the returned future (client went away) cancels the gather.
async fn image_set(
    state: &AppState,
    source_id: Option<&str>,
    chapter_id: &str,
) -> Result<ImageSet, ApiError> {
    let source = state.sources().comics.get(source_id).await?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let path = format!("/chapters/{}/images", chapter_id);
    let key = common::key(DOMAIN, "images", &path, source.id()).arg("chapter_id", chapter_id);
    common::detail_if(
        state.cache(),
        key,
        TtlClass::Content,
        source.id(),
        ImageSet::is_complete,
        source.images(chapter_id, &cancel),
    )
    .await
}

/// GET /chapters/{id}/images
pub async fn images(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<ImageSet>, ApiError> {
    Ok(Json(image_set(&state, query.source(), &id).await?))
}

/// GET /chapters/{id}/images/{page}
pub async fn image(
    State(state): State<Arc<AppState>>,
    Path((id, page)): Path<(String, u32)>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<ComicImage>, ApiError> {
    if page == 0 {
        return Err(ApiError::bad_request("page must be at least 1"));
    }
    image_set(&state, query.source(), &id)
        .await?
        .images
        .into_iter()
        .find(|image| image.page == page)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("{} page {}", id, page)))
}
