mod config;
mod constants;
mod domain;
mod logging;
mod models;
mod routes;
mod services;

use anyhow::Context;
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use config::Config;
use domain::detection_log::DetectionLog;
use services::face_detector::CascadeFaceDetector;
use services::frame_session::FrameSession;

pub struct AppState {
    frames: Arc<FrameSession>,
    detection_log: Arc<DetectionLog>,
    static_dir: PathBuf,
    max_frame_message_bytes: usize,
}

fn build_app(state: Arc<AppState>) -> Router {
    routes::build_routes()
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build shared state. The detection log is prepared first so it exists even
/// when the cascade cannot be loaded.
async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let detection_log = Arc::new(DetectionLog::new(&config.detection_log_path));
    detection_log.initialize().await.with_context(|| {
        format!(
            "Failed to initialize detection log at {}",
            detection_log.path().display()
        )
    })?;

    let detector = CascadeFaceDetector::from_file(&config.face_cascade_path).with_context(|| {
        format!(
            "Failed to load face cascade from {} (models/fetch-cascade.sh downloads the default one)",
            config.face_cascade_path.display()
        )
    })?;

    let frames = Arc::new(FrameSession::new(
        Arc::new(detector),
        Arc::clone(&detection_log),
    ));

    Ok(Arc::new(AppState {
        frames,
        detection_log,
        static_dir: config.static_dir.clone(),
        max_frame_message_bytes: config.max_frame_message_bytes,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let config = Config::from_env();

    let state = build_state(&config).await?;
    let app = build_app(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    log::info!("Listening on http://{}", addr);
    log::info!(
        "[frames] Logging detections to {}",
        config.detection_log_path.display()
    );
    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
