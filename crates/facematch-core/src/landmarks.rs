//! 68-point facial landmark model (PFLD-style regression over a face crop).
//!
//! The model sees a square 112×112 crop around the detected face and regresses
//! 68 points in iBUG-300W order, normalized to the crop. The five alignment
//! points used by the recognizer are derived from them.

use crate::error::{InferenceError, ModelLoadError};
use crate::models::open_session;
use crate::types::{BoundingBox, Point};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::ops::Range;
use std::path::Path;

pub const LANDMARK_COUNT: usize = 68;

const LANDMARK_INPUT_SIZE: u32 = 112;
/// Extra context around the detector box, as a fraction of its longer side.
const CROP_MARGIN: f32 = 0.1;

// iBUG-300W indices. "Image-left" is the subject's right.
const IMAGE_LEFT_EYE: Range<usize> = 36..42;
const IMAGE_RIGHT_EYE: Range<usize> = 42..48;
const NOSE_TIP: usize = 30;
const MOUTH_LEFT: usize = 48;
const MOUTH_RIGHT: usize = 54;
const MOUTH: Range<usize> = 48..68;

/// Pixel region of the source image fed to the landmark model.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CropRegion {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl CropRegion {
    /// Square region around `face`, grown by the margin and clipped to the image.
    fn around(face: &BoundingBox, image_width: u32, image_height: u32) -> Option<Self> {
        let side = face.width.max(face.height) * (1.0 + 2.0 * CROP_MARGIN);
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;

        let x0 = (cx - side / 2.0).floor().max(0.0) as u32;
        let y0 = (cy - side / 2.0).floor().max(0.0) as u32;
        let x1 = ((cx + side / 2.0).ceil().max(0.0) as u32).min(image_width);
        let y1 = ((cy + side / 2.0).ceil().max(0.0) as u32).min(image_height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    fn to_image(&self, nx: f32, ny: f32) -> Point {
        (
            self.x as f32 + nx * self.width as f32,
            self.y as f32 + ny * self.height as f32,
        )
    }
}

/// 68-point landmarks for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    pub points: Vec<Point>,
}

impl Landmarks {
    fn centroid(&self, range: Range<usize>) -> Point {
        let n = range.len() as f32;
        let (sx, sy) = self.points[range]
            .iter()
            .fold((0.0f32, 0.0f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        (sx / n, sy / n)
    }

    /// Centroids of [left_eye, right_eye, mouth], which place the dlib chip.
    pub fn chip_centroids(&self) -> [Point; 3] {
        [
            self.centroid(IMAGE_LEFT_EYE),
            self.centroid(IMAGE_RIGHT_EYE),
            self.centroid(MOUTH),
        ]
    }

    /// Reduce to [left_eye, right_eye, nose, left_mouth, right_mouth] in image
    /// order, the layout expected by [`crate::alignment::align_face`].
    pub fn alignment_points(&self) -> [Point; 5] {
        [
            self.centroid(IMAGE_LEFT_EYE),
            self.centroid(IMAGE_RIGHT_EYE),
            self.points[NOSE_TIP],
            self.points[MOUTH_LEFT],
            self.points[MOUTH_RIGHT],
        ]
    }
}

pub struct LandmarkModel {
    session: Session,
}

impl LandmarkModel {
    pub fn load(model_path: &Path) -> Result<Self, ModelLoadError> {
        let session = open_session(model_path, "68-point landmark")?;
        Ok(Self { session })
    }

    /// Locate the 68 landmarks of `face` in `image` coordinates.
    pub fn locate(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Landmarks, InferenceError> {
        let region = CropRegion::around(face, image.width(), image.height()).ok_or_else(|| {
            InferenceError::Failed(format!(
                "face box ({:.1}, {:.1}, {:.1}×{:.1}) lies outside the image",
                face.x, face.y, face.width, face.height
            ))
        })?;

        let crop =
            imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();
        let input = preprocess(&crop);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // PFLD exports may also emit an auxiliary pose tensor; take the one with 136 values.
        let mut coords = None;
        for (_, value) in outputs.iter() {
            if let Ok((_, data)) = value.try_extract_tensor::<f32>() {
                if data.len() == LANDMARK_COUNT * 2 {
                    coords = Some(data.to_vec());
                    break;
                }
            }
        }
        let coords = coords.ok_or_else(|| {
            InferenceError::Failed(format!("no landmark output with {} values", LANDMARK_COUNT * 2))
        })?;

        Ok(decode(&coords, &region))
    }
}

/// Resize a crop to 112×112 and scale to [0, 1] in NCHW layout.
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = LANDMARK_INPUT_SIZE;
    let resized = imageops::resize(crop, size, size, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

fn decode(coords: &[f32], region: &CropRegion) -> Landmarks {
    let points = coords
        .chunks_exact(2)
        .map(|xy| region.to_image(xy[0], xy[1]))
        .collect();
    Landmarks { points }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, keypoints: None }
    }

    #[test]
    fn test_crop_region_square_with_margin() {
        let region = CropRegion::around(&face(100.0, 100.0, 50.0, 100.0), 640, 480).unwrap();
        // side = 100 * 1.2 = 120, centred on (125, 150)
        assert_eq!(region, CropRegion { x: 65, y: 90, width: 120, height: 120 });
    }

    #[test]
    fn test_crop_region_clipped_at_border() {
        let region = CropRegion::around(&face(0.0, 0.0, 100.0, 100.0), 80, 80).unwrap();
        assert_eq!(region.x, 0);
        assert_eq!(region.y, 0);
        assert_eq!(region.width, 80);
        assert_eq!(region.height, 80);
    }

    #[test]
    fn test_crop_region_outside_image() {
        assert!(CropRegion::around(&face(500.0, 500.0, 10.0, 10.0), 100, 100).is_none());
    }

    #[test]
    fn test_decode_maps_into_image() {
        let region = CropRegion { x: 10, y: 20, width: 100, height: 50 };
        let mut coords = vec![0.0f32; LANDMARK_COUNT * 2];
        coords[0] = 0.5;
        coords[1] = 1.0;
        let lm = decode(&coords, &region);
        assert_eq!(lm.points.len(), LANDMARK_COUNT);
        assert_eq!(lm.points[0], (60.0, 70.0));
        assert_eq!(lm.points[1], (10.0, 20.0));
    }

    #[test]
    fn test_alignment_points() {
        let mut points = vec![(0.0f32, 0.0f32); LANDMARK_COUNT];
        for i in 36..42 {
            points[i] = (30.0 + (i - 36) as f32 * 2.0, 50.0);
        }
        for i in 42..48 {
            points[i] = (70.0 + (i - 42) as f32 * 2.0, 52.0);
        }
        points[30] = (55.0, 70.0);
        points[48] = (40.0, 90.0);
        points[54] = (72.0, 91.0);

        let five = Landmarks { points }.alignment_points();
        assert!((five[0].0 - 35.0).abs() < 1e-5 && (five[0].1 - 50.0).abs() < 1e-5);
        assert!((five[1].0 - 75.0).abs() < 1e-5 && (five[1].1 - 52.0).abs() < 1e-5);
        assert_eq!(five[2], (55.0, 70.0));
        assert_eq!(five[3], (40.0, 90.0));
        assert_eq!(five[4], (72.0, 91.0));
    }

    #[test]
    fn test_preprocess_range() {
        let crop = RgbImage::from_pixel(60, 40, image::Rgb([255, 0, 51]));
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert!((tensor[[0, 0, 5, 5]] - 1.0).abs() < 1e-2);
        assert!(tensor[[0, 1, 5, 5]].abs() < 1e-2);
        assert!((tensor[[0, 2, 5, 5]] - 0.2).abs() < 1e-2);
    }

    #[test]
    fn test_chip_centroids_average_mouth() {
        let mut points = vec![(0.0f32, 0.0f32); LANDMARK_COUNT];
        for i in 36..42 {
            points[i] = (30.0, 50.0);
        }
        for i in 42..48 {
            points[i] = (70.0, 50.0);
        }
        for i in 48..68 {
            points[i] = (40.0 + (i - 48) as f32, 90.0);
        }

        let [left, right, mouth] = Landmarks { points }.chip_centroids();
        assert_eq!(left, (30.0, 50.0));
        assert_eq!(right, (70.0, 50.0));
        assert!((mouth.0 - 49.5).abs() < 1e-5 && (mouth.1 - 90.0).abs() < 1e-5);
    }
}
