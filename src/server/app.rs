use axum::Router;
use tower_http::trace::TraceLayer;

use super::{render, AppState};

/// The service has a single path-agnostic endpoint: every request, whatever
/// its path, goes to [`render`], which dispatches on method and query.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .fallback(render)
        // Add middleware
        .layer(TraceLayer::new_for_http())
        // Add state
        .with_state(state)
}
