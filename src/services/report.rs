//! Session summary computed from the detection log.
//!
//! Single-face entries carry the meaningful metrics; frames with no face or
//! several faces are only counted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::DetectionEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub total_entries: usize,
    pub single_face_entries: usize,
    pub multi_face_entries: usize,
    pub no_face_entries: usize,
    /// Mean deception score over single-face entries
    pub average_deception_score: f64,
    /// Blink rate of the most recent single-face entry
    pub latest_blink_rate: f64,
    pub expression_counts: BTreeMap<String, usize>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

pub fn summarize(events: &[DetectionEvent]) -> DetectionReport {
    let single: Vec<&DetectionEvent> = events.iter().filter(|e| e.faces_detected == 1).collect();

    let average_deception_score = if single.is_empty() {
        0.0
    } else {
        single.iter().map(|e| e.deception_score).sum::<f64>() / single.len() as f64
    };

    let mut expression_counts = BTreeMap::new();
    for e in &single {
        *expression_counts.entry(e.expression.clone()).or_insert(0) += 1;
    }

    DetectionReport {
        total_entries: events.len(),
        single_face_entries: single.len(),
        multi_face_entries: events.iter().filter(|e| e.faces_detected > 1).count(),
        no_face_entries: events.iter().filter(|e| e.faces_detected == 0).count(),
        average_deception_score,
        latest_blink_rate: single.last().map_or(0.0, |e| e.blink_rate),
        expression_counts,
        first_timestamp: events.first().map(|e| e.timestamp),
        last_timestamp: events.last().map(|e| e.timestamp),
    }
}
