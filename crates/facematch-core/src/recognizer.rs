//! Face recognizers via ONNX Runtime.
//!
//! Two descriptor models are supported. The default is the 128-d dlib ResNet
//! (the network behind face-api's `faceRecognitionNet`), whose descriptors are
//! compared by Euclidean distance against 0.6. ArcFace produces 512-d unit
//! vectors and needs a looser distance (see
//! [`RecognizerKind::calibrated_threshold`]).

use crate::alignment::{align_face, crop_chip, ALIGNED_SIZE};
use crate::decision::MATCH_THRESHOLD;
use crate::error::{InferenceError, ModelLoadError};
use crate::landmarks::Landmarks;
use crate::models::open_session;
use crate::types::Embedding;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

const DLIB_CHIP_SIZE: u32 = 150;
const DLIB_MEAN: [f32; 3] = [122.782, 117.001, 104.298];
const DLIB_SCALE: f32 = 1.0 / 256.0;

const ARCFACE_MEAN: [f32; 3] = [127.5; 3];
const ARCFACE_SCALE: f32 = 1.0 / 127.5; // symmetric, unlike SCRFD's 128.0

/// Euclidean cutoff for ArcFace unit vectors, equal to cosine similarity 0.4.
const ARCFACE_DISTANCE_THRESHOLD: f32 = 1.095;

/// Which descriptor network the recognizer model file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerKind {
    /// dlib ResNet, 150×150 chip, 128-d descriptor used as produced.
    #[default]
    Dlib,
    /// ArcFace, 112×112 similarity-aligned crop, 512-d L2-normalized embedding.
    ArcFace,
}

impl RecognizerKind {
    /// Side of the square face crop the network takes.
    pub fn input_size(self) -> u32 {
        match self {
            RecognizerKind::Dlib => DLIB_CHIP_SIZE,
            RecognizerKind::ArcFace => ALIGNED_SIZE,
        }
    }

    /// Euclidean distance the model's descriptors are calibrated for.
    pub fn calibrated_threshold(self) -> f32 {
        match self {
            RecognizerKind::Dlib => MATCH_THRESHOLD,
            RecognizerKind::ArcFace => ARCFACE_DISTANCE_THRESHOLD,
        }
    }

    fn normalization(self) -> ([f32; 3], f32) {
        match self {
            RecognizerKind::Dlib => (DLIB_MEAN, DLIB_SCALE),
            RecognizerKind::ArcFace => (ARCFACE_MEAN, ARCFACE_SCALE),
        }
    }
}

impl fmt::Display for RecognizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognizerKind::Dlib => f.write_str("dlib"),
            RecognizerKind::ArcFace => f.write_str("arcface"),
        }
    }
}

/// Face descriptor network.
pub struct FaceRecognizer {
    session: Session,
    kind: RecognizerKind,
    model_version: String,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path, kind: RecognizerKind) -> Result<Self, ModelLoadError> {
        let label = match kind {
            RecognizerKind::Dlib => "dlib ResNet",
            RecognizerKind::ArcFace => "ArcFace",
        };
        let session = open_session(model_path, label)?;
        let model_version = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            session,
            kind,
            model_version,
        })
    }

    pub fn kind(&self) -> RecognizerKind {
        self.kind
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Cut the face out of `image` the way this network expects it.
    pub fn face_chip(
        &self,
        image: &RgbImage,
        landmarks: &Landmarks,
    ) -> Result<RgbImage, InferenceError> {
        match self.kind {
            RecognizerKind::Dlib => crop_chip(image, &landmarks.chip_centroids(), DLIB_CHIP_SIZE)
                .ok_or_else(|| InferenceError::Failed("face chip lies outside the image".into())),
            RecognizerKind::ArcFace => Ok(align_face(image, &landmarks.alignment_points())),
        }
    }

    /// Describe a face chip produced by [`FaceRecognizer::face_chip`].
    pub fn embed(&mut self, chip: &RgbImage) -> Result<Embedding, InferenceError> {
        let size = self.kind.input_size();
        if chip.dimensions() != (size, size) {
            return Err(InferenceError::Failed(format!(
                "{} face chip must be {size}×{size}, got {}×{}",
                self.kind,
                chip.width(),
                chip.height()
            )));
        }

        let input = preprocess(chip, self.kind);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Failed(format!("embedding extraction: {e}")))?;

        if raw.is_empty() {
            return Err(InferenceError::Failed("embedding model returned an empty tensor".into()));
        }

        let values = match self.kind {
            RecognizerKind::Dlib => raw.to_vec(),
            RecognizerKind::ArcFace => l2_normalize(raw.to_vec()),
        };

        Ok(Embedding {
            values,
            model_version: Some(self.model_version.clone()),
        })
    }
}

fn preprocess(chip: &RgbImage, kind: RecognizerKind) -> Array4<f32> {
    let (mean, scale) = kind.normalization();
    let (w, h) = chip.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in chip.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - mean[c]) * scale;
        }
    }
    tensor
}

/// Scale to unit length; a zero vector is returned unchanged.
fn l2_normalize(mut values: Vec<f32>) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    }
    values
}
