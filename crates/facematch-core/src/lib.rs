//! facematch-core — decide whether two images show the same person.
//!
//! Faces are located with SCRFD or UltraFace, refined with a 68-point
//! landmark model, cropped, and described with the 128-d dlib ResNet (or
//! ArcFace), all via ONNX Runtime. Two descriptors match when their
//! Euclidean distance is at most 0.6.

pub mod alignment;
pub mod decision;
pub mod detector;
pub mod error;
pub mod landmarks;
pub mod models;
pub mod procedure;
pub mod recognizer;
pub mod source;
pub mod types;

pub use decision::{euclidean_distance, MatchVerdict, MATCH_THRESHOLD};
pub use detector::{DetectorVariant, FaceDetector};
pub use error::{ImageLoadError, InferenceError, MatchError, ModelLoadError, SourceError};
pub use models::FaceModels;
pub use recognizer::RecognizerKind;
pub use procedure::{compare_faces, Comparison, FaceEmbedder, Side};
pub use source::{FileSource, ImageSource};
pub use types::{BoundingBox, Embedding, FaceDescriptor};
