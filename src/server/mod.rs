//! snipbin HTTP server
//!
//! Thin axum front-end over [`SnippetStore`]. It owns the concerns the store
//! leaves to its caller: request size limits and admin-token checks.

pub mod auth;
pub mod handlers;
pub mod routes;

use axum::{extract::Extension, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::snippet::SnippetStore;

pub use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: SnippetStore,
    pub config: ServerConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish()
    }
}

/// Build the router with all routes and layers, registering metrics
pub fn build_router(state: AppState) -> Router {
    crate::metrics::init_metrics();

    let enable_cors = state.config.enable_cors;

    let app = Router::new()
        .merge(routes::snippet_routes())
        .merge(routes::health_routes())
        .layer(Extension(Arc::new(state)))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the snipbin HTTP server
pub async fn start_server(config: ServerConfig, store: SnippetStore) -> anyhow::Result<()> {
    info!(
        addr = %config.bind,
        port = config.port,
        "Starting snipbin HTTP server"
    );

    let addr = format!("{}:{}", config.bind, config.port);
    let app = build_router(AppState { store, config });
    let listener = TcpListener::bind(&addr).await?;

    info!("Server listening on http://{}", addr);
    info!("🔍 Metrics: http://{}/_metrics", addr);
    info!("❤️  Health: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            anyhow::anyhow!("Server failed: {}", e)
        })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
