//! UltraFace RFB-320 face detector (the fast variant).

use super::{nms, REDUCED_RESOLUTION};
use crate::error::{InferenceError, ModelLoadError};
use crate::models::open_session;
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const ULTRAFACE_MEAN: f32 = 127.0;
const ULTRAFACE_STD: f32 = 128.0;
const ULTRAFACE_CONFIDENCE_THRESHOLD: f32 = 0.7;
const ULTRAFACE_NMS_THRESHOLD: f32 = 0.3;

/// UltraFace-based face detector. No keypoints.
pub struct UltraFaceDetector {
    session: Session,
    scores_idx: usize,
    boxes_idx: usize,
}

impl UltraFaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, ModelLoadError> {
        let session = open_session(model_path, "UltraFace")?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 2 {
            return Err(ModelLoadError::Layout {
                path: model_path.to_path_buf(),
                reason: format!("UltraFace needs scores and boxes outputs, got {}", names.len()),
            });
        }
        let scores_idx = names.iter().position(|n| n == "scores").unwrap_or(0);
        let boxes_idx = names.iter().position(|n| n == "boxes").unwrap_or(1);

        Ok(Self {
            session,
            scores_idx,
            boxes_idx,
        })
    }

    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, InferenceError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let input = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[self.scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Failed(format!("UltraFace scores: {e}")))?;
        let (_, boxes) = outputs[self.boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Failed(format!("UltraFace boxes: {e}")))?;

        if scores.len() / 2 != boxes.len() / 4 {
            return Err(InferenceError::Failed(format!(
                "UltraFace output mismatch: {} scores vs {} boxes",
                scores.len() / 2,
                boxes.len() / 4
            )));
        }

        let candidates = decode(scores, boxes, image.width() as f32, image.height() as f32);
        Ok(nms(candidates, ULTRAFACE_NMS_THRESHOLD))
    }
}

/// Stretch to 320×240 and normalize into a 1×3×240×320 tensor.
fn preprocess(image: &RgbImage) -> Array4<f32> {
    let (w, h) = REDUCED_RESOLUTION;
    let resized = imageops::resize(image, w, h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
        }
    }
    tensor
}

/// Decode `[N, 2]` (background, face) scores and `[N, 4]` normalized corner boxes.
fn decode(scores: &[f32], boxes: &[f32], width: f32, height: f32) -> Vec<BoundingBox> {
    scores
        .chunks_exact(2)
        .zip(boxes.chunks_exact(4))
        .filter(|(s, _)| s[1] > ULTRAFACE_CONFIDENCE_THRESHOLD)
        .filter_map(|(s, b)| {
            let x1 = (b[0] * width).clamp(0.0, width);
            let y1 = (b[1] * height).clamp(0.0, height);
            let x2 = (b[2] * width).clamp(0.0, width);
            let y2 = (b[3] * height).clamp(0.0, height);
            if x2 <= x1 || y2 <= y1 {
                return None;
            }
            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: s[1],
                keypoints: None,
            })
        })
        .collect()
}
