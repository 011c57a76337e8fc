//! Frame session service - decode → detect → log → respond for one inbound frame.
//!
//! Used by the WebSocket route. Every call produces exactly one
//! [`AnalysisResult`]; nothing here returns an error to the caller.

use std::sync::Arc;
use thiserror::Error;

use crate::domain::detection_log::DetectionLog;
use crate::models::{AnalysisResult, DetectionEvent, FrameMetrics, FrameOutcome, FramePayload};
use crate::services::decoder::{DecodeError, decode_data_url};
use crate::services::error::LogErr;
use crate::services::face_detector::FaceDetector;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("frame analysis worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub struct FrameSession {
    detector: Arc<dyn FaceDetector>,
    detection_log: Arc<DetectionLog>,
}

impl FrameSession {
    pub fn new(detector: Arc<dyn FaceDetector>, detection_log: Arc<DetectionLog>) -> Self {
        Self {
            detector,
            detection_log,
        }
    }

    /// Analyze one frame and build the reply for the originating client
    pub async fn handle(&self, payload: FramePayload) -> AnalysisResult {
        let metrics = payload.metrics();
        let outcome = self.process(payload.image, &metrics).await;
        AnalysisResult::from_outcome(outcome, &metrics)
    }

    async fn process(&self, image: String, metrics: &FrameMetrics) -> FrameOutcome {
        let faces_detected = match self.count_faces(image).await {
            Ok(n) => n,
            Err(e) => {
                log::warn!("[frame] Rejected frame: {}", e);
                return FrameOutcome::Error {
                    message: e.to_string(),
                };
            }
        };

        let event = DetectionEvent::new(faces_detected, metrics);
        // Persistence failures never reach the client
        if let Some(len) = self
            .detection_log
            .append(&event)
            .await
            .log_swallow("[frame] Failed to append detection event")
        {
            log::debug!(
                "[frame] {} face(s), expression={}, log size {}",
                faces_detected,
                event.expression,
                len
            );
        }

        FrameOutcome::Success { faces_detected }
    }

    /// Decoding and detection are CPU-bound, so they run off the async workers
    async fn count_faces(&self, image: String) -> Result<usize, FrameError> {
        let detector = Arc::clone(&self.detector);
        let faces = tokio::task::spawn_blocking(move || -> Result<usize, DecodeError> {
            let gray = decode_data_url(&image)?;
            Ok(detector.count_faces(&gray))
        })
        .await??;
        Ok(faces)
    }
}
