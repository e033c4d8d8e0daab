//! API routes.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::handlers::render::render;
use crate::handlers::sessions::{append, finalize, init, status};
use crate::handlers::templates::list_templates;
use crate::handlers::health;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/render", post(render))
        .route("/render/init", post(init))
        .route("/render/append", post(append))
        .route("/render/finalize", post(finalize))
        .route("/render/status/:session_id", get(status))
        .route("/templates", get(list_templates));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health))
        .nest_service("/videos", ServeDir::new(&state.config.output_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
