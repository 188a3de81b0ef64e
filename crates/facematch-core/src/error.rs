//! Error taxonomy for model loading, image loading and the comparison itself.
//!
//! "No face detected" is deliberately absent: it is a defined outcome of a
//! comparison (see [`crate::procedure::Comparison::NoFace`]), not a failure.

use std::path::PathBuf;
use thiserror::Error;

/// A model file or the model manifest could not be loaded. Always fatal.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),
    #[error("malformed model {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },
    #[error("unexpected layout in model {path}: {reason}")]
    Layout { path: PathBuf, reason: String },
    #[error("failed to read model manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed model manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// An image file is missing or cannot be decoded.
#[derive(Error, Debug)]
pub enum ImageLoadError {
    #[error("image not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to load image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Failure of an [`ImageSource`](crate::source::ImageSource).
#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Image(#[from] ImageLoadError),
    #[error("capture failed: {0}")]
    Capture(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A model ran but its output could not be used.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Failed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Top-level error of a face comparison run.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error(transparent)]
    ImageLoad(#[from] ImageLoadError),
    #[error("capture failed: {0}")]
    Capture(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid embedding: dimension mismatch ({left} vs {right})")]
    InvalidEmbedding { left: usize, right: usize },
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl From<SourceError> for MatchError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Image(e) => MatchError::ImageLoad(e),
            SourceError::Capture(e) => MatchError::Capture(e),
        }
    }
}
