//! Single-page client and its static assets (/, /static/*, /health)

use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse},
    routing::get,
};
use std::sync::Arc;

use crate::AppState;
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/static/{*path}", get(serve_static))
}

async fn health() -> &'static str {
    "ok"
}

/// GET / - The webcam client page
async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, StatusCode> {
    let page = tokio::fs::read_to_string(state.static_dir.join("index.html"))
        .await
        .log_500("Failed to read index.html")?;
    Ok(Html(page))
}

/// GET /static/*path - Client scripts and styles
async fn serve_static(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    // Security: reject paths with traversal attempts or null bytes upfront
    if path.contains("..") || path.contains('\0') {
        return Err(StatusCode::FORBIDDEN);
    }

    let full_path = state.static_dir.join(&path);

    // Security: ensure the path doesn't escape the static directory
    let canonical = full_path
        .canonicalize()
        .map_err(|_| StatusCode::NOT_FOUND)?; // Silent - expected for missing files
    let static_canonical = state
        .static_dir
        .canonicalize()
        .log_500("Failed to canonicalize static dir")?;

    if !canonical.starts_with(&static_canonical) {
        return Err(StatusCode::FORBIDDEN);
    }

    let bytes = tokio::fs::read(&canonical)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    let content_type = match canonical.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    };

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
