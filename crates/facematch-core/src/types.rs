use serde::{Deserialize, Serialize};

/// A 2-D point in image pixel coordinates.
pub type Point = (f32, f32);

/// Bounding box for a detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Detector keypoints when the detector provides them (SCRFD does, UltraFace does not):
    /// [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub keypoints: Option<[Point; 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - overlap;

        if union > 0.0 {
            overlap / union
        } else {
            0.0
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace, 128 for dlib-style models).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model that produced this embedding (e.g. "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// Everything extracted for one detected face.
#[derive(Debug, Clone, Serialize)]
pub struct FaceDescriptor {
    pub face: BoundingBox,
    /// 68-point landmarks in iBUG-300W order.
    pub landmarks: Vec<Point>,
    #[serde(skip)]
    pub embedding: Embedding,
}
