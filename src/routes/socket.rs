//! Real-time frame channel over WebSocket
//!
//! Every message is a JSON envelope `{"event": <name>, "data": <payload>}`.
//! Clients send `frame` events and receive exactly one `analysis` event back
//! per message, in order.

use axum::{
    Router,
    extract::{State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::IntoResponse,
    routing::get,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::models::{AnalysisResult, FramePayload};
use crate::services::frame_session::FrameSession;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/socket", get(frame_ws))
}

/// Event from client
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
enum ClientEvent {
    #[serde(rename = "frame")]
    Frame(FramePayload),
}

/// Event to client
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data")]
enum ServerEvent {
    #[serde(rename = "analysis")]
    Analysis(AnalysisResult),
}

/// GET /socket - WebSocket for streaming frames
async fn frame_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.max_message_size(state.max_frame_message_bytes)
        .on_upgrade(move |socket| handle_frame_ws(socket, state))
}

async fn handle_frame_ws(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    log::info!("[socket] Client connected");
    pump(&state.frames, sender, receiver).await;
    log::info!("[socket] Client disconnected");
}

/// Answer text messages one at a time, in arrival order, until the client
/// closes or the connection fails
async fn pump<S, R, E>(frames: &FrameSession, mut sender: S, mut receiver: R)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue, // Ignore binary, ping, pong
            Err(e) => {
                log::warn!("[socket] WebSocket error: {}", e);
                break;
            }
        };

        let reply = answer(frames, text.as_str()).await;
        if sender.send(Message::Text(reply.into())).await.is_err() {
            break;
        }
    }

    let _ = sender.close().await;
}

/// Sent when an analysis cannot be serialized, so every message still gets a reply
const ENCODE_FAILURE_REPLY: &str = r#"{"event":"analysis","data":{"faces_detected":0,"status":"error","message":"Failed to encode analysis","expression":"None","deception_score":0.0}}"#;

/// Turn one inbound message into the serialized `analysis` reply
async fn answer(frames: &FrameSession, text: &str) -> String {
    let result = match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::Frame(payload)) => frames.handle(payload).await,
        Err(e) => {
            log::warn!("[socket] Invalid event: {}", e);
            AnalysisResult::rejected(format!("Invalid event: {}", e))
        }
    };
    serde_json::to_string(&ServerEvent::Analysis(result)).unwrap_or_else(|e| {
        log::error!("[socket] Failed to encode analysis: {}", e);
        ENCODE_FAILURE_REPLY.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection_log::DetectionLog;
    use crate::services::face_detector::FixedFaceDetector;
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde_json::Value;
    use tempfile::TempDir;

    fn session(dir: &TempDir) -> FrameSession {
        FrameSession::new(
            Arc::new(FixedFaceDetector(1)),
            Arc::new(DetectionLog::new(dir.path().join("detection_log.json"))),
        )
    }

    #[tokio::test]
    async fn test_bad_frame_gets_error_analysis() {
        let dir = TempDir::new().unwrap();
        let reply = answer(
            &session(&dir),
            r#"{"event": "frame", "data": {"image": "not-a-data-url"}}"#,
        )
        .await;

        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["event"], "analysis");
        assert_eq!(reply["data"]["status"], "error");
        assert_eq!(reply["data"]["faces_detected"], 0);
        assert!(!reply["data"]["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_gets_error_analysis() {
        let dir = TempDir::new().unwrap();
        for text in [r#"{"event": "ping", "data": {}}"#, "not json"] {
            let reply = answer(&session(&dir), text).await;
            let reply: Value = serde_json::from_str(&reply).unwrap();
            assert_eq!(reply["event"], "analysis");
            assert_eq!(reply["data"]["status"], "error");
            assert_eq!(reply["data"]["expression"], "None");
        }
    }

    #[tokio::test]
    async fn test_metrics_are_echoed_on_error() {
        let dir = TempDir::new().unwrap();
        let reply = answer(
            &session(&dir),
            r#"{"event": "frame", "data": {"image": "data:,@@", "expression": "sad", "deception_score": 7.5}}"#,
        )
        .await;

        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["data"]["status"], "error");
        assert_eq!(reply["data"]["expression"], "sad");
        assert_eq!(reply["data"]["deception_score"], 7.5);
    }

    fn frame_event(expression: &str) -> String {
        let img = image::DynamicImage::ImageLuma8(image::GrayImage::new(8, 8));
        let mut png = std::io::Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageFormat::Png).unwrap();
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(png.into_inner()));
        serde_json::json!({
            "event": "frame",
            "data": {"image": data_url, "expression": expression}
        })
        .to_string()
    }

    async fn replies(rx: futures::channel::mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
        rx.map(|msg| match msg {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected reply {:?}", other),
        })
        .collect()
        .await
    }

    #[tokio::test]
    async fn test_one_reply_per_text_message_in_order() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(DetectionLog::new(dir.path().join("detection_log.json")));
        let frames = FrameSession::new(Arc::new(FixedFaceDetector(1)), Arc::clone(&log));
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let inbound = futures::stream::iter(vec![
            Ok::<_, axum::Error>(Message::Text(frame_event("happy").into())),
            Ok(Message::Binary(vec![1u8, 2, 3].into())),
            Ok(Message::Text("not json".into())),
            Ok(Message::Text(frame_event("sad").into())),
            Ok(Message::Close(None)),
            Ok(Message::Text(frame_event("after close").into())),
        ]);

        pump(&frames, tx, inbound).await;

        let replies = replies(rx).await;
        assert_eq!(replies.len(), 3);
        assert!(replies.iter().all(|r| r["event"] == "analysis"));
        assert_eq!(replies[0]["data"]["status"], "success");
        assert_eq!(replies[0]["data"]["expression"], "happy");
        assert_eq!(replies[1]["data"]["status"], "error");
        assert_eq!(replies[2]["data"]["status"], "success");
        assert_eq!(replies[2]["data"]["expression"], "sad");

        let logged: Vec<String> = log
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.expression)
            .collect();
        assert_eq!(logged, ["happy", "sad"]);
    }

    #[tokio::test]
    async fn test_connection_error_ends_session() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let inbound = futures::stream::iter(vec![
            Ok(Message::Text(frame_event("happy").into())),
            Err(axum::Error::new(std::io::Error::other("connection reset"))),
            Ok(Message::Text(frame_event("sad").into())),
        ]);

        pump(&session(&dir), tx, inbound).await;

        let replies = replies(rx).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["data"]["expression"], "happy");
    }

    #[test]
    fn test_encode_failure_reply_matches_analysis_shape() {
        let fallback: Value = serde_json::from_str(ENCODE_FAILURE_REPLY).unwrap();
        let regular =
            serde_json::to_value(ServerEvent::Analysis(AnalysisResult::rejected("x"))).unwrap();

        assert_eq!(fallback["event"], "analysis");
        assert_eq!(fallback["data"]["status"], "error");
        let keys = |v: &Value| {
            let mut keys: Vec<String> = v["data"].as_object().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        };
        assert_eq!(keys(&fallback), keys(&regular));
    }
}
