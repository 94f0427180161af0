//! HTTP routes definition

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Snippet routes
///
/// - POST   /api/snippets      - Create a snippet
/// - GET    /api/snippets/:id  - Fetch a snippet, consuming one view
/// - DELETE /api/snippets/:id  - Delete a snippet (requires x-admin-token)
pub fn snippet_routes() -> Router {
    Router::new()
        .route("/api/snippets", post(handlers::create_snippet))
        .route(
            "/api/snippets/:id",
            get(handlers::fetch_snippet).delete(handlers::delete_snippet),
        )
}

/// Health check and metrics routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/_metrics", get(handlers::metrics_endpoint))
}
