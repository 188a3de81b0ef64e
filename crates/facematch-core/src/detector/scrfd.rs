//! SCRFD face detector (the accurate variant).
//!
//! Anchor-free decoding over three strides with five keypoints per face,
//! followed by NMS.

use super::nms;
use crate::error::{InferenceError, ModelLoadError};
use crate::models::open_session;
use crate::types::{BoundingBox, Point};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Where the score, bbox and keypoint tensors of one stride sit in the model outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideSlots {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// How a source image was placed inside the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let size = SCRFD_INPUT_SIZE as f32;
        let scale = (size / width as f32).min(size / height as f32);
        let (new_w, new_h) = Self::scaled_dims(width, height, scale);
        Self {
            scale,
            offset_x: ((SCRFD_INPUT_SIZE - new_w) / 2) as f32,
            offset_y: ((SCRFD_INPUT_SIZE - new_h) / 2) as f32,
        }
    }

    fn scaled_dims(width: u32, height: u32, scale: f32) -> (u32, u32) {
        let w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        let h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        (w, h)
    }

    /// Map a point in model input space back to the source image.
    fn unmap(&self, x: f32, y: f32) -> Point {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }
}

/// SCRFD-based face detector.
pub struct ScrfdDetector {
    session: Session,
    slots: [StrideSlots; 3],
}

impl ScrfdDetector {
    pub fn load(model_path: &Path) -> Result<Self, ModelLoadError> {
        let session = open_session(model_path, "SCRFD")?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        if output_names.len() < 9 {
            return Err(ModelLoadError::Layout {
                path: model_path.to_path_buf(),
                reason: format!(
                    "SCRFD needs 9 outputs (3 strides × score/bbox/kps), got {}",
                    output_names.len()
                ),
            });
        }

        let slots = output_slots(&output_names);
        tracing::debug!(?slots, "SCRFD output tensor mapping");

        Ok(Self { session, slots })
    }

    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, InferenceError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slots, &stride) in self.slots.iter().zip(SCRFD_STRIDES.iter()) {
            let tensor = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data.to_vec())
                    .map_err(|e| {
                        InferenceError::Failed(format!("SCRFD {what} stride {stride}: {e}"))
                    })
            };
            let scores = tensor(slots.score, "scores")?;
            let boxes = tensor(slots.bbox, "boxes")?;
            let kps = tensor(slots.kps, "keypoints")?;

            candidates.extend(decode_stride(&scores, &boxes, &kps, stride, &letterbox));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Letterbox an RGB image into a normalized 1×3×640×640 tensor.
///
/// The padding is left at zero, which is what SCRFD_MEAN normalizes to.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height());
    let (new_w, new_h) = Letterbox::scaled_dims(image.width(), image.height(), letterbox.scale);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    let ox = letterbox.offset_x as usize;
    let oy = letterbox.offset_y as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, oy + y as usize, ox + x as usize]] =
                (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Pick output tensors by name ("score_8", "bbox_16", "kps_32", ...), falling
/// back to the standard export order [scores 8/16/32, boxes 8/16/32, kps 8/16/32].
fn output_slots(names: &[String]) -> [StrideSlots; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named = |stride: usize| -> Option<StrideSlots> {
        Some(StrideSlots {
            score: position("score", stride)?,
            bbox: position("bbox", stride)?,
            kps: position("kps", stride)?,
        })
    };

    match (named(SCRFD_STRIDES[0]), named(SCRFD_STRIDES[1]), named(SCRFD_STRIDES[2])) {
        (Some(s8), Some(s16), Some(s32)) => [s8, s16, s32],
        _ => {
            tracing::debug!(?names, "SCRFD output names not recognized, using positional mapping");
            std::array::from_fn(|i| StrideSlots { score: i, bbox: i + 3, kps: i + 6 })
        }
    }
}

/// Decode the anchors of one stride that clear the confidence threshold.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<BoundingBox> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score <= SCRFD_CONFIDENCE_THRESHOLD {
                return None;
            }
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * step;
            let ay = (cell / grid) as f32 * step;

            let d = boxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.unmap(ax - d[0] * step, ay - d[1] * step);
            let (x2, y2) = letterbox.unmap(ax + d[2] * step, ay + d[3] * step);

            let keypoints = kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| {
                    letterbox.unmap(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step)
                })
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                keypoints,
            })
        })
        .collect()
}
