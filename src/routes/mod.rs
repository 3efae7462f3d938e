pub mod auth;
pub mod feed;
pub mod profile;
pub mod upload;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The whole HTTP surface, ready to serve.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(upload::router(&state))
        .merge(auth::router())
        .merge(feed::router())
        .merge(profile::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
