//! Model directory layout and the loaded model set.

use crate::detector::{DetectorVariant, FaceDetector};
use crate::error::{MatchError, ModelLoadError};
use crate::landmarks::LandmarkModel;
use crate::procedure::FaceEmbedder;
use crate::recognizer::{FaceRecognizer, RecognizerKind};
use crate::types::FaceDescriptor;
use image::RgbImage;
use ort::session::Session;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional manifest in the model directory overriding file names.
pub const MANIFEST_FILE: &str = "models.toml";

/// File names of the four models, relative to the model directory, and the
/// kind of descriptor network the recognizer file holds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelManifest {
    pub accurate_detector: String,
    pub fast_detector: String,
    pub landmarks: String,
    pub recognizer: String,
    pub recognizer_kind: RecognizerKind,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            accurate_detector: "det_10g.onnx".to_string(),
            fast_detector: "version-RFB-320.onnx".to_string(),
            landmarks: "landmark_68.onnx".to_string(),
            recognizer: "dlib_face_recognition_resnet_model_v1.onnx".to_string(),
            recognizer_kind: RecognizerKind::Dlib,
        }
    }
}

impl ModelManifest {
    /// Read `models.toml` from `model_dir`, or the defaults when it is absent.
    pub fn load(model_dir: &Path) -> Result<Self, ModelLoadError> {
        let path = model_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|source| ModelLoadError::ManifestRead {
            path: path.clone(),
            source,
        })?;
        let manifest = toml::from_str(&text)
            .map_err(|source| ModelLoadError::ManifestParse { path: path.clone(), source })?;
        tracing::debug!(path = %path.display(), ?manifest, "loaded model manifest");
        Ok(manifest)
    }

    pub fn detector(&self, variant: DetectorVariant) -> &str {
        match variant {
            DetectorVariant::Accurate => &self.accurate_detector,
            DetectorVariant::Fast => &self.fast_detector,
        }
    }
}

/// Resolved paths of the three models one run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub landmarks: PathBuf,
    pub recognizer: PathBuf,
    pub recognizer_kind: RecognizerKind,
}

impl ModelPaths {
    pub fn resolve(model_dir: &Path, variant: DetectorVariant) -> Result<Self, ModelLoadError> {
        let manifest = ModelManifest::load(model_dir)?;
        Ok(Self {
            detector: model_dir.join(manifest.detector(variant)),
            landmarks: model_dir.join(&manifest.landmarks),
            recognizer: model_dir.join(&manifest.recognizer),
            recognizer_kind: manifest.recognizer_kind,
        })
    }
}

/// Open an ONNX Runtime session, reporting a missing file before ort does.
pub(crate) fn open_session(model_path: &Path, label: &str) -> Result<Session, ModelLoadError> {
    if !model_path.exists() {
        return Err(ModelLoadError::NotFound(model_path.to_path_buf()));
    }

    let session = build_session(model_path).map_err(|source| ModelLoadError::Malformed {
        path: model_path.to_path_buf(),
        source,
    })?;

    tracing::info!(
        model = label,
        path = %model_path.display(),
        inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded model"
    );

    Ok(session)
}

fn build_session(model_path: &Path) -> Result<Session, ort::Error> {
    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Detector, landmark model and recognizer, loaded once per process.
pub struct FaceModels {
    detector: FaceDetector,
    landmarks: LandmarkModel,
    recognizer: FaceRecognizer,
}

impl FaceModels {
    /// Load all three models. Fails on the first missing or malformed file.
    pub fn load(model_dir: &Path, variant: DetectorVariant) -> Result<Self, ModelLoadError> {
        let paths = ModelPaths::resolve(model_dir, variant)?;
        tracing::debug!(?paths, %variant, "loading models");

        let detector = FaceDetector::load(variant, &paths.detector)?;
        let landmarks = LandmarkModel::load(&paths.landmarks)?;
        let recognizer = FaceRecognizer::load(&paths.recognizer, paths.recognizer_kind)?;
        tracing::info!(
            %variant,
            recognizer = recognizer.model_version(),
            kind = %recognizer.kind(),
            "models ready"
        );

        Ok(Self {
            detector,
            landmarks,
            recognizer,
        })
    }

    pub fn variant(&self) -> DetectorVariant {
        self.detector.variant()
    }

    pub fn recognizer_kind(&self) -> RecognizerKind {
        self.recognizer.kind()
    }
}

impl FaceEmbedder for FaceModels {
    fn extract(&mut self, image: &RgbImage) -> Result<Vec<FaceDescriptor>, MatchError> {
        let faces = self.detector.detect(image)?;
        tracing::debug!(count = faces.len(), variant = %self.variant(), "faces detected");

        let mut descriptors = Vec::with_capacity(faces.len());
        for face in faces {
            let landmarks = self.landmarks.locate(image, &face)?;
            let chip = self.recognizer.face_chip(image, &landmarks)?;
            let embedding = self.recognizer.embed(&chip)?;
            descriptors.push(FaceDescriptor {
                face,
                landmarks: landmarks.points,
                embedding,
            });
        }
        Ok(descriptors)
    }
}
