use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{comics, convert, ebooks, handlers, middleware::metrics_middleware, podcasts, proxy, videos};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health, sources and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/sources", get(handlers::list_sources))
        .route("/metrics", get(handlers::get_metrics))
        // Comics
        .route("/comics/categories", get(comics::categories))
        .route("/comics/hot", get(comics::hot))
        .route("/comics/latest", get(comics::latest))
        .route("/comics/category", get(comics::by_category))
        .route("/comics/search", get(comics::search))
        .route("/comics/{id}", get(comics::detail))
        .route("/comics/{id}/chapters", get(comics::chapters))
        .route("/chapters/{id}/images", get(comics::images))
        .route("/chapters/{id}/images/{page}", get(comics::image))
        // E-books
        .route("/ebooks/categories", get(ebooks::categories))
        .route("/ebooks/category", get(ebooks::by_category))
        .route("/ebooks/search", get(ebooks::search))
        .route("/ebooks/metadata", get(ebooks::metadata))
        .route("/ebooks/chapters/{id}", get(ebooks::chapter_content))
        .route("/ebooks/{id}", get(ebooks::detail))
        .route("/ebooks/{id}/chapters", get(ebooks::chapters))
        // Podcasts
        .route("/podcasts/categories", get(podcasts::categories))
        .route("/podcasts/hot", get(podcasts::hot))
        .route("/podcasts/latest", get(podcasts::latest))
        .route("/podcasts/category", get(podcasts::by_category))
        .route("/podcasts/search", get(podcasts::search))
        .route("/podcasts/episodes/{id}", get(podcasts::episode_detail))
        .route("/podcasts/{id}", get(podcasts::detail))
        .route("/podcasts/{id}/episodes", get(podcasts::episodes))
        // Videos
        .route("/videos/categories", get(videos::categories))
        .route("/videos/category", get(videos::by_category))
        .route("/videos/search", get(videos::search))
        .route("/videos/episodes/{id}", get(videos::episode_detail))
        .route("/videos/{id}", get(videos::detail))
        .route("/videos/{id}/episodes", get(videos::episodes))
        // Conversion
        .route("/videos/convert", post(convert::convert))
        .route("/videos/convert/status/{task_id}", get(convert::status))
        .route(
            "/videos/download/{series_id}/{file_name}",
            get(convert::download),
        )
        // Proxy
        .route("/proxy/image", get(proxy::image))
        .route("/proxy/video", get(proxy::video))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
