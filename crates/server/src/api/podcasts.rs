//! Podcast and audiobook API handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    Json,
};

use mediahub_core::{Category, Episode, EpisodeDetail, Listing, Program, TtlClass};

use super::common::{self, Collection};
use super::error::ApiError;
use super::extract::{Path, Query};
use super::params::{CategoryQuery, PageQuery, SearchQuery, SourceQuery};
use crate::state::AppState;

const DOMAIN: &str = "podcasts";

/// GET /podcasts/categories
pub async fn categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Collection<Category>>, ApiError> {
    let source = state.sources().podcasts.get(query.source()).await?;
    let key = common::key(DOMAIN, "categories", "/podcasts/categories", source.id());
    Ok(Json(
        common::categories(state.cache(), key, source.categories()).await,
    ))
}

/// GET /podcasts/hot
pub async fn hot(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Listing<Program>>, ApiError> {
    let paging = query.paging()?;
    let source = state.sources().podcasts.get(query.source()).await?;
    let key = common::paged(common::key(DOMAIN, "hot", "/podcasts/hot", source.id()), paging);
    Ok(Json(
        common::listing(state.cache(), key, TtlClass::Hot, source.hot(paging)).await,
    ))
}

/// GET /podcasts/latest
pub async fn latest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Listing<Program>>, ApiError> {
    let paging = query.paging()?;
    let source = state.sources().podcasts.get(query.source()).await?;
    let key = common::paged(common::key(DOMAIN, "latest", "/podcasts/latest", source.id()), paging);
    Ok(Json(
        common::listing(state.cache(), key, TtlClass::List, source.latest(paging)).await,
    ))
}

/// GET /podcasts/category?category=
pub async fn by_category(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Listing<Program>>, ApiError> {
    let paging = query.paging()?;
    let category = query.category()?;
    let source = state.sources().podcasts.get(query.source()).await?;
    let key = common::paged(
        common::key(DOMAIN, "category", "/podcasts/category", source.id()),
        paging,
    )
    .query("category", category);
    Ok(Json(
        common::listing(
            state.cache(),
            key,
            TtlClass::List,
            source.programs(category, paging),
        )
        .await,
    ))
}

/// GET /podcasts/search?keyword=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Listing<Program>>, ApiError> {
    let paging = query.paging()?;
    let source = state.sources().podcasts.get(query.source()).await?;
    let Some(keyword) = query.keyword() else {
        return Ok(Json(Listing::empty(paging)));
    };
    let key = common::paged(common::key(DOMAIN, "search", "/podcasts/search", source.id()), paging)
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

/// GET /podcasts/{id}
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Program>, ApiError> {
    let source = state.sources().podcasts.get(query.source()).await?;
    let key = common::key(DOMAIN, "detail", &format!("/podcasts/{}", id), source.id())
        .arg("id", &id);
    let program = common::detail(
        state.cache(),
        key,
        TtlClass::Detail,
        source.id(),
        source.detail(&id),
    )
    .await?;
    Ok(Json(program))
}

/// GET /podcasts/{id}/episodes
pub async fn episodes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Collection<Episode>>, ApiError> {
    let source = state.sources().podcasts.get(query.source()).await?;
    let key = common::key(DOMAIN, "episodes", &format!("/podcasts/{}/episodes", id), source.id())
        .arg("id", &id);
    let episodes = common::detail(
        state.cache(),
        key,
        TtlClass::Detail,
        source.id(),
        source.episodes(&id),
    )
    .await?;
    Ok(Json(Collection::from(episodes)))
}

/// GET /podcasts/episodes/{id}
///
/// Audio URLs are often signed and short-lived, so they are never cached.
pub async fn episode_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<EpisodeDetail>, ApiError> {
    let source = state.sources().podcasts.get(query.source()).await?;
    let detail = source
        .episode_detail(&id)
        .await
        .map_err(|e| ApiError::source(source.id(), e))?;
    Ok(Json(detail))
}
