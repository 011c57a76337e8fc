//! Read-only views over the detection log (/report, /detections)

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::AppState;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::models::DetectionEvent;
use crate::services::error::LogErr;
use crate::services::report::{DetectionReport, summarize};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/report", get(get_report))
        .route("/detections", get(list_detections))
        // The log changes on every frame
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}

/// GET /report - Session summary over the whole log
async fn get_report(State(state): State<Arc<AppState>>) -> Result<Json<DetectionReport>, StatusCode> {
    let events = state
        .detection_log
        .read_all()
        .await
        .log_500("Read detection log error")?;
    Ok(Json(summarize(&events)))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

/// GET /detections?limit=N - Most recent events, oldest first
async fn list_detections(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DetectionEvent>>, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let mut events = state
        .detection_log
        .read_all()
        .await
        .log_500("Read detection log error")?;
    let skip = events.len().saturating_sub(limit);
    events.drain(..skip);

    Ok(Json(events))
}
