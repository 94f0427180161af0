//! HTTP route handlers

use axum::{
    extract::{Extension, Json, Path},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument, warn};

use super::auth::{check_admin_token, TokenCheck};
use crate::error::Error;
use crate::server::AppState;
use crate::snippet::{Deletion, NewSnippet, SnippetRecord};

/// Create request
#[derive(Debug, Deserialize)]
pub struct CreateSnippetRequest {
    pub code: String,
    /// View budget, 0 = unlimited, at most `i64::MAX`
    #[serde(default)]
    pub max_usage: u64,
    /// Seconds until expiry, 0 = never
    #[serde(default)]
    pub lifetime: i64,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Snippet response
#[derive(Debug, Serialize)]
pub struct SnippetResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<SnippetRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SnippetResponse {
    fn ok(snippet: Option<SnippetRecord>) -> Self {
        Self {
            success: true,
            snippet,
            error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            snippet: None,
            error: Some(message.into()),
        }
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(SnippetResponse::failed(message))).into_response()
}

/// Map a store error onto an HTTP response
fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::AllocationExhausted { .. } | Error::BackendUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = %err, "Snippet operation failed");
    }

    let message = match err {
        Error::NotFound(_) => "Snippet not found".to_string(),
        other => other.to_string(),
    };
    failure(status, message)
}

/// Create a snippet
///
/// POST /api/snippets
#[instrument(skip(state, payload), fields(code_len = payload.code.len()))]
pub async fn create_snippet(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateSnippetRequest>,
) -> Response {
    if payload.code.len() > state.config.max_code_bytes {
        warn!(limit = state.config.max_code_bytes, "Snippet too large");
        return failure(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "Snippet exceeds maximum size of {} bytes",
                state.config.max_code_bytes
            ),
        );
    }

    let snippet = NewSnippet {
        code: payload.code,
        max_usage: payload.max_usage,
        lifetime: payload.lifetime,
        parent_id: payload.parent_id,
        token: payload.token,
    };

    match state.store.create(snippet).await {
        Ok(record) => (
            StatusCode::CREATED,
            Json(SnippetResponse::ok(Some(record))),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Fetch a snippet, consuming one view
///
/// GET /api/snippets/:id
#[instrument(skip(state))]
pub async fn fetch_snippet(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.fetch(&id).await {
        Ok(record) => Json(SnippetResponse::ok(Some(record))).into_response(),
        Err(e) => error_response(e),
    }
}

/// Delete a snippet
///
/// DELETE /api/snippets/:id
///
/// The token comparison runs inside the store's read-and-delete step, so the
/// record checked is the record removed.
#[instrument(skip(state, headers))]
pub async fn delete_snippet(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let granted = |record: &SnippetRecord| {
        check_admin_token(&headers, record.token.as_deref()) == TokenCheck::Granted
    };

    let record = match state.store.delete_if(&id, granted).await {
        Ok(Deletion::Deleted(_)) => return Json(SnippetResponse::ok(None)).into_response(),
        Ok(Deletion::Refused(record)) => record,
        Err(e) => return error_response(e),
    };

    match check_admin_token(&headers, record.token.as_deref()) {
        TokenCheck::Missing => failure(StatusCode::UNAUTHORIZED, "Missing admin token"),
        TokenCheck::Granted | TokenCheck::Denied => {
            warn!(ident = %id, "Invalid admin token");
            failure(StatusCode::FORBIDDEN, "Invalid admin token")
        }
    }
}

/// Health check
pub async fn health_check() -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "version": crate::VERSION,
    }))
    .into_response()
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::export_metrics(),
    )
        .into_response()
}
