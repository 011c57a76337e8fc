pub mod page;
pub mod report;
pub mod socket;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the service
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(page::routes())
        .merge(report::routes())
        .merge(socket::routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::domain::detection_log::DetectionLog;
    use crate::models::{DetectionEvent, FrameMetrics};
    use crate::services::face_detector::FixedFaceDetector;
    use crate::services::frame_session::FrameSession;

    fn test_state(dir: &TempDir) -> Arc<AppState> {
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(static_dir.join("js")).unwrap();
        std::fs::write(static_dir.join("index.html"), "<h1>facewatch</h1>").unwrap();
        std::fs::write(static_dir.join("js").join("app.js"), "console.log(1);").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "secret").unwrap();

        let detection_log = Arc::new(DetectionLog::new(dir.path().join("detection_log.json")));
        Arc::new(AppState {
            frames: Arc::new(FrameSession::new(
                Arc::new(FixedFaceDetector(1)),
                Arc::clone(&detection_log),
            )),
            detection_log,
            static_dir,
            max_frame_message_bytes: 1024 * 1024,
        })
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = build_routes()
            .with_state(Arc::clone(state))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn seed(state: &Arc<AppState>, count: usize) {
        for i in 0..count {
            let metrics = FrameMetrics {
                expression: format!("expr-{}", i),
                deception_score: i as f64,
                blink_rate: 0.0,
            };
            state
                .detection_log
                .append(&DetectionEvent::new(1, &metrics))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_index_and_health() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let (status, content_type, body) = get(&state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/html"));
        assert_eq!(body, "<h1>facewatch</h1>");

        let (status, _, body) = get(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_socket_requires_upgrade() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let (status, _, _) = get(&state, "/socket").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_static_assets() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let (status, content_type, body) = get(&state, "/static/js/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/javascript"));
        assert_eq!(body, "console.log(1);");

        let (status, _, _) = get(&state, "/static/missing.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = get(&state, "/static/..%2Fsecret.txt").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_report_over_log() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        seed(&state, 3).await;

        let (status, _, body) = get(&state, "/report").await;
        assert_eq!(status, StatusCode::OK);
        let report: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(report["total_entries"], 3);
        assert_eq!(report["single_face_entries"], 3);
        assert_eq!(report["average_deception_score"], 1.0);
    }

    #[tokio::test]
    async fn test_detections_returns_latest() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        seed(&state, 5).await;

        let (status, _, body) = get(&state, "/detections?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let events: Vec<Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["expression"], "expr-3");
        assert_eq!(events[1]["expression"], "expr-4");

        let (_, _, body) = get(&state, "/detections").await;
        let events: Vec<Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_unreadable_log_is_500() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        std::fs::write(dir.path().join("detection_log.json"), "garbage").unwrap();

        let (status, _, _) = get(&state, "/report").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
