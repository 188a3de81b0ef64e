//! Face detectors.
//!
//! Two interchangeable detectors: SCRFD (slower, more accurate) and
//! UltraFace RFB-320 (faster, lower input resolution).

mod scrfd;
mod ultraface;

pub use scrfd::ScrfdDetector;
pub use ultraface::UltraFaceDetector;

use crate::error::{InferenceError, ModelLoadError};
use crate::types::BoundingBox;
use image::RgbImage;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Fixed smaller resolution images are shrunk to when resizing is enabled.
pub const REDUCED_RESOLUTION: (u32, u32) = (320, 240);

/// Which face localization model to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorVariant {
    /// SCRFD at 640×640.
    #[default]
    Accurate,
    /// UltraFace at 320×240.
    Fast,
}

impl DetectorVariant {
    /// Resize applied to input images unless overridden by the caller.
    pub fn default_resize(self) -> Option<(u32, u32)> {
        match self {
            DetectorVariant::Accurate => None,
            DetectorVariant::Fast => Some(REDUCED_RESOLUTION),
        }
    }
}

impl fmt::Display for DetectorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorVariant::Accurate => f.write_str("accurate"),
            DetectorVariant::Fast => f.write_str("fast"),
        }
    }
}

impl FromStr for DetectorVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accurate" | "scrfd" => Ok(DetectorVariant::Accurate),
            "fast" | "ultraface" | "tiny" => Ok(DetectorVariant::Fast),
            other => Err(format!("unknown detector variant: {other} (expected accurate or fast)")),
        }
    }
}

/// A loaded face detector of either variant.
pub enum FaceDetector {
    Scrfd(ScrfdDetector),
    UltraFace(UltraFaceDetector),
}

impl FaceDetector {
    pub fn load(variant: DetectorVariant, model_path: &Path) -> Result<Self, ModelLoadError> {
        Ok(match variant {
            DetectorVariant::Accurate => FaceDetector::Scrfd(ScrfdDetector::load(model_path)?),
            DetectorVariant::Fast => FaceDetector::UltraFace(UltraFaceDetector::load(model_path)?),
        })
    }

    pub fn variant(&self) -> DetectorVariant {
        match self {
            FaceDetector::Scrfd(_) => DetectorVariant::Accurate,
            FaceDetector::UltraFace(_) => DetectorVariant::Fast,
        }
    }

    /// Detect faces, most confident first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, InferenceError> {
        match self {
            FaceDetector::Scrfd(d) => d.detect(image),
            FaceDetector::UltraFace(d) => d.detect(image),
        }
    }
}

fn by_confidence_desc(a: &BoundingBox, b: &BoundingBox) -> std::cmp::Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(std::cmp::Ordering::Equal)
}

/// Greedy non-maximum suppression. Returns survivors sorted by confidence.
pub(crate) fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(by_confidence_desc);

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
