//! Video API handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    Json,
};

use mediahub_core::{Category, Listing, TtlClass, Video, VideoEpisode, VideoEpisodeDetail};

use super::common::{self, Collection};
use super::error::ApiError;
use super::extract::{Path, Query};
use super::params::{CategoryQuery, SearchQuery, SourceQuery};
use crate::state::AppState;

const DOMAIN: &str = "videos";

/// GET /videos/categories
pub async fn categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Collection<Category>>, ApiError> {
    let source = state.sources().videos.get(query.source()).await?;
    let key = common::key(DOMAIN, "categories", "/videos/categories", source.id());
    Ok(Json(
        common::categories(state.cache(), key, source.categories()).await,
    ))
}

/// GET /videos/category?category=
pub async fn by_category(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Listing<Video>>, ApiError> {
    let paging = query.paging()?;
    let category = query.category()?;
    let source = state.sources().videos.get(query.source()).await?;
    let key = common::paged(
        common::key(DOMAIN, "category", "/videos/category", source.id()),
        paging,
    )
    .query("category", category);
    Ok(Json(
        common::listing(
            state.cache(),
            key,
            TtlClass::List,
            source.videos(category, paging),
        )
        .await,
    ))
}

/// GET /videos/search?keyword=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Listing<Video>>, ApiError> {
    let paging = query.paging()?;
    let source = state.sources().videos.get(query.source()).await?;
    let Some(keyword) = query.keyword() else {
        return Ok(Json(Listing::empty(paging)));
    };
    let key = common::paged(common::key(DOMAIN, "search", "/videos/search", source.id()), paging)
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

/// GET /videos/{id}
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Video>, ApiError> {
    let source = state.sources().videos.get(query.source()).await?;
    let key = common::key(DOMAIN, "detail", &format!("/videos/{}", id), source.id()).arg("id", &id);
    let video = common::detail(
        state.cache(),
        key,
        TtlClass::Detail,
        source.id(),
        source.detail(&id),
    )
    .await?;
    Ok(Json(video))
}

/// GET /videos/{id}/episodes
pub async fn episodes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Collection<VideoEpisode>>, ApiError> {
    let source = state.sources().videos.get(query.source()).await?;
    let key = common::key(DOMAIN, "episodes", &format!("/videos/{}/episodes", id), source.id())
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

/// GET /videos/episodes/{id}
///
/// Resolved stream URLs carry expiring signatures; never cached.
pub async fn episode_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<VideoEpisodeDetail>, ApiError> {
    let source = state.sources().videos.get(query.source()).await?;
    let detail = source
        .episode_detail(&id)
        .await
        .map_err(|e| ApiError::source(source.id(), e))?;
    Ok(Json(detail))
}
