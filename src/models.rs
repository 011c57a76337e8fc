//! Shared data models used across modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_EXPRESSION;

/// One logged frame analysis. Appended to the detection log, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub timestamp: DateTime<Utc>,
    pub faces_detected: usize,
    pub expression: String,
    pub deception_score: f64,
    pub blink_rate: f64,
}

impl DetectionEvent {
    /// Stamp a new event with the current server time
    pub fn new(faces_detected: usize, metrics: &FrameMetrics) -> Self {
        Self {
            timestamp: Utc::now(),
            faces_detected,
            expression: metrics.expression.clone(),
            deception_score: metrics.deception_score,
            blink_rate: metrics.blink_rate,
        }
    }
}

/// Inbound `frame` event body.
///
/// Metrics stay optional here so "absent" and "zero" remain distinguishable
/// until [`FramePayload::metrics`] applies the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FramePayload {
    #[serde(default)]
    pub image: String,
    pub expression: Option<String>,
    pub deception_score: Option<f64>,
    pub blink_rate: Option<f64>,
}

/// Client-supplied metrics with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetrics {
    pub expression: String,
    pub deception_score: f64,
    pub blink_rate: f64,
}

impl Default for FrameMetrics {
    fn default() -> Self {
        Self {
            expression: DEFAULT_EXPRESSION.to_string(),
            deception_score: 0.0,
            blink_rate: 0.0,
        }
    }
}

impl FramePayload {
    pub fn metrics(&self) -> FrameMetrics {
        let defaults = FrameMetrics::default();
        FrameMetrics {
            expression: self.expression.clone().unwrap_or(defaults.expression),
            deception_score: self.deception_score.unwrap_or(defaults.deception_score),
            blink_rate: self.blink_rate.unwrap_or(defaults.blink_rate),
        }
    }
}

/// Result of pushing one frame through decode → detect → log
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Success { faces_detected: usize },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Success,
    Error,
}

/// Outbound `analysis` event body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub faces_detected: usize,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub expression: String,
    pub deception_score: f64,
}

impl AnalysisResult {
    /// Map a pipeline outcome to the client payload, echoing the request's metrics
    pub fn from_outcome(outcome: FrameOutcome, metrics: &FrameMetrics) -> Self {
        let (faces_detected, status, message) = match outcome {
            FrameOutcome::Success { faces_detected } => {
                (faces_detected, AnalysisStatus::Success, None)
            }
            FrameOutcome::Error { message } => (0, AnalysisStatus::Error, Some(message)),
        };

        Self {
            faces_detected,
            status,
            message,
            expression: metrics.expression.clone(),
            deception_score: metrics.deception_score,
        }
    }

    /// Error result for a message that never made it into the pipeline
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::from_outcome(
            FrameOutcome::Error {
                message: message.into(),
            },
            &FrameMetrics::default(),
        )
    }
}
