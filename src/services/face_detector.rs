//! Face counting on grayscale frames.

use image::GrayImage;
use std::path::Path;

use crate::constants::{DETECTION_GROUP_EPS, DETECTION_MIN_NEIGHBORS, DETECTION_SCALE_FACTOR};
use crate::services::cascade::{Cascade, CascadeError, Rect};

/// Pluggable face detection backend.
///
/// Implementations hold no per-call state, so one instance is shared by
/// every connection.
pub trait FaceDetector: Send + Sync {
    fn count_faces(&self, gray: &GrayImage) -> usize;
}

/// Sliding-window detector backed by a pretrained Haar cascade
pub struct CascadeFaceDetector {
    cascade: Cascade,
    scale_factor: f64,
    min_neighbors: usize,
}

impl CascadeFaceDetector {
    pub fn new(cascade: Cascade) -> Self {
        Self {
            cascade,
            scale_factor: DETECTION_SCALE_FACTOR,
            min_neighbors: DETECTION_MIN_NEIGHBORS,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        let cascade = Cascade::from_file(path)?;
        let (w, h) = cascade.window_size();
        log::info!(
            "Loaded face cascade {} ({} stages, {}x{} window)",
            path.display(),
            cascade.stage_count(),
            w,
            h
        );
        Ok(Self::new(cascade))
    }

    pub fn detect(&self, gray: &GrayImage) -> Vec<Rect> {
        self.cascade.detect_multi_scale(
            gray,
            self.scale_factor,
            self.min_neighbors,
            DETECTION_GROUP_EPS,
        )
    }
}

impl FaceDetector for CascadeFaceDetector {
    fn count_faces(&self, gray: &GrayImage) -> usize {
        self.detect(gray).len()
    }
}

/// Detector that always reports the same count
#[cfg(test)]
pub struct FixedFaceDetector(pub usize);

#[cfg(test)]
impl FaceDetector for FixedFaceDetector {
    fn count_faces(&self, _gray: &GrayImage) -> usize {
        self.0
    }
}
