use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let camera_routes = Router::new()
        .route("/cam/:id", get(handlers::cam_stream))
        .route("/cam/:id/status", get(handlers::cam_status))
        .route("/cam/:id/restart", get(handlers::cam_restart))
        .route("/cam/:id/snapshot", get(handlers::cam_snapshot))
        .route("/cameras", get(handlers::list_cameras));

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .merge(camera_routes)
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
