//! Face crops for the recognizers.
//!
//! ArcFace takes a 4-DOF similarity warp that puts five alignment points on
//! fixed reference positions of a 112×112 crop. The dlib descriptor takes an
//! axis-aligned square sized from the eye-to-mouth distance, padded and
//! resized to its chip size.

use crate::types::Point;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// ArcFace reference points for a 112×112 output.
pub const REFERENCE_POINTS_112: [Point; 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Scale+rotation `[a -b; b a]` followed by translation `(tx, ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    pub const IDENTITY: Similarity = Similarity { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 };

    /// Least-squares similarity mapping `src` onto `dst`.
    ///
    /// Closed form on mean-centred points. Degenerate input (all `src`
    /// points coincident) yields the identity.
    pub fn estimate(src: &[Point; 5], dst: &[Point; 5]) -> Self {
        let mean = |pts: &[Point; 5]| {
            let (sx, sy) = pts.iter().fold((0.0f32, 0.0f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
            (sx / 5.0, sy / 5.0)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (s, d) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (s.0 - msx, s.1 - msy);
            let (dx, dy) = (d.0 - mdx, d.1 - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }

        if norm < 1e-12 {
            return Self::IDENTITY;
        }

        let a = dot / norm;
        let b = cross / norm;
        Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        }
    }

    pub fn apply(&self, (x, y): Point) -> Point {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// Inverse transform, or `None` when the scale is zero.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }
}

/// Bilinear sample; outside the image reads as black.
fn sample(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let texel = |px: f32, py: f32| -> [f32; 3] {
        if px < 0.0 || py < 0.0 || px >= image.width() as f32 || py >= image.height() as f32 {
            return [0.0; 3];
        }
        let p = image.get_pixel(px as u32, py as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let tl = texel(x0, y0);
    let tr = texel(x0 + 1.0, y0);
    let bl = texel(x0, y0 + 1.0);
    let br = texel(x0 + 1.0, y0 + 1.0);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bottom = bl[c] * (1.0 - fx) + br[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Warp `image` through `transform` into a square `size`×`size` output.
pub fn warp(image: &RgbImage, transform: &Similarity, size: u32) -> RgbImage {
    let Some(inverse) = transform.inverse() else {
        return RgbImage::new(size, size);
    };
    RgbImage::from_fn(size, size, |ox, oy| {
        let (sx, sy) = inverse.apply((ox as f32, oy as f32));
        sample(image, sx, sy)
    })
}

/// Align a face to the canonical 112×112 ArcFace crop.
pub fn align_face(image: &RgbImage, points: &[Point; 5]) -> RgbImage {
    let transform = Similarity::estimate(points, &REFERENCE_POINTS_112);
    warp(image, &transform, ALIGNED_SIZE)
}

/// Mean eye-to-mouth distance as a share of the chip side.
const CHIP_EYE_MOUTH_RATIO: f32 = 0.45;
/// Share of the chip side above the centroid of eyes and mouth.
const CHIP_TOP_SHARE: f32 = 0.43;

/// Square face region for the dlib chip, clipped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ChipRegion {
    /// Region from the [left_eye, right_eye, mouth] centroids.
    pub fn from_centroids(
        &[left_eye, right_eye, mouth]: &[Point; 3],
        image_width: u32,
        image_height: u32,
    ) -> Option<Self> {
        let to_mouth = |p: Point| ((mouth.0 - p.0).powi(2) + (mouth.1 - p.1).powi(2)).sqrt();
        let eye_to_mouth = (to_mouth(left_eye) + to_mouth(right_eye)) / 2.0;
        let side = (eye_to_mouth / CHIP_EYE_MOUTH_RATIO).floor();
        if side.is_nan() || side < 1.0 {
            return None;
        }

        let cx = (left_eye.0 + right_eye.0 + mouth.0) / 3.0;
        let cy = (left_eye.1 + right_eye.1 + mouth.1) / 3.0;
        let x = (cx - 0.5 * side).max(0.0).floor();
        let y = (cy - CHIP_TOP_SHARE * side).max(0.0).floor();
        if x >= image_width as f32 || y >= image_height as f32 {
            return None;
        }

        let (x, y, side) = (x as u32, y as u32, side as u32);
        Some(Self {
            x,
            y,
            width: side.min(image_width - x),
            height: side.min(image_height - y),
        })
    }
}

/// Crop the dlib chip, pad it to a square with black at the bottom and right,
/// and resize to `size`×`size`. `None` when the region misses the image.
pub fn crop_chip(image: &RgbImage, centroids: &[Point; 3], size: u32) -> Option<RgbImage> {
    let region = ChipRegion::from_centroids(centroids, image.width(), image.height())?;
    let face =
        imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();

    let side = region.width.max(region.height);
    let mut square = RgbImage::new(side, side);
    imageops::replace(&mut square, &face, 0, 0);
    Some(imageops::resize(&square, size, size, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_estimate() {
        let t = Similarity::estimate(&REFERENCE_POINTS_112, &REFERENCE_POINTS_112);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_half_scale_estimate() {
        let src: [Point; 5] = std::array::from_fn(|i| {
            (REFERENCE_POINTS_112[i].0 * 2.0, REFERENCE_POINTS_112[i].1 * 2.0)
        });
        let t = Similarity::estimate(&src, &REFERENCE_POINTS_112);
        let scale = (t.a * t.a + t.b * t.b).sqrt();
        assert!((scale - 0.5).abs() < 1e-3, "scale = {scale}");
        assert!(t.b.abs() < 1e-4);
    }

    #[test]
    fn test_rotation_estimate_maps_points() {
        // 90° rotation plus translation.
        let truth = Similarity { a: 0.0, b: 1.0, tx: 10.0, ty: -4.0 };
        let src = REFERENCE_POINTS_112;
        let dst: [Point; 5] = std::array::from_fn(|i| truth.apply(src[i]));
        let t = Similarity::estimate(&src, &dst);
        for i in 0..5 {
            let (x, y) = t.apply(src[i]);
            assert!((x - dst[i].0).abs() < 1e-3 && (y - dst[i].1).abs() < 1e-3);
        }
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Similarity { a: 0.8, b: 0.3, tx: 5.0, ty: 7.0 };
        let inv = t.inverse().unwrap();
        let p = (12.0, -3.0);
        let (x, y) = inv.apply(t.apply(p));
        assert!((x - p.0).abs() < 1e-4 && (y - p.1).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_points_fall_back_to_identity() {
        let src = [(5.0, 5.0); 5];
        assert_eq!(Similarity::estimate(&src, &REFERENCE_POINTS_112), Similarity::IDENTITY);
        let zero = Similarity { a: 0.0, b: 0.0, tx: 0.0, ty: 0.0 };
        assert!(zero.inverse().is_none());
    }

    #[test]
    fn test_align_face_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let aligned = align_face(&image, &REFERENCE_POINTS_112);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        assert_eq!(*aligned.get_pixel(56, 56), Rgb([128, 128, 128]));
    }

    #[test]
    fn test_warp_outside_is_black() {
        let image = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        let shift = Similarity { a: 1.0, b: 0.0, tx: 50.0, ty: 50.0 };
        let out = warp(&image, &shift, 20);
        assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_alignment_point_lands_on_reference() {
        // Bright patch at the left eye should reappear at the reference left eye.
        let mut image = RgbImage::new(200, 200);
        let src: [Point; 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        for dy in 0..5 {
            for dx in 0..5 {
                image.put_pixel(78 + dx, 58 + dy, Rgb([255, 255, 255]));
            }
        }

        let aligned = align_face(&image, &src);
        let rx = REFERENCE_POINTS_112[0].0.round() as u32;
        let ry = REFERENCE_POINTS_112[0].1.round() as u32;

        let brightest = (rx - 1..=rx + 1)
            .flat_map(|x| (ry - 1..=ry + 1).map(move |y| (x, y)))
            .map(|(x, y)| aligned.get_pixel(x, y)[0])
            .max()
            .unwrap_or(0);
        assert!(brightest > 100, "expected bright patch near ({rx}, {ry}), max={brightest}");
    }

    const CENTROIDS: [Point; 3] = [(38.0, 50.0), (62.0, 50.0), (50.0, 66.0)];

    #[test]
    fn test_chip_region_from_centroids() {
        // eye-to-mouth 20 -> side floor(20 / 0.45) = 44, centred on (50, 55.33)
        let region = ChipRegion::from_centroids(&CENTROIDS, 200, 200).unwrap();
        assert_eq!(region, ChipRegion { x: 28, y: 36, width: 44, height: 44 });
    }

    #[test]
    fn test_chip_region_clipped() {
        let region = ChipRegion::from_centroids(&CENTROIDS, 60, 60).unwrap();
        assert_eq!(region, ChipRegion { x: 28, y: 36, width: 32, height: 24 });
    }

    #[test]
    fn test_chip_region_degenerate() {
        assert!(ChipRegion::from_centroids(&[(5.0, 5.0); 3], 100, 100).is_none());
        let far = [(538.0, 550.0), (562.0, 550.0), (550.0, 566.0)];
        assert!(ChipRegion::from_centroids(&far, 100, 100).is_none());
    }

    #[test]
    fn test_crop_chip_pads_bottom_with_black() {
        let image = RgbImage::from_pixel(60, 60, Rgb([200, 100, 50]));
        let chip = crop_chip(&image, &CENTROIDS, 150).unwrap();
        assert_eq!(chip.dimensions(), (150, 150));

        let top = chip.get_pixel(10, 10);
        assert!(top[0].abs_diff(200) <= 1 && top[1].abs_diff(100) <= 1 && top[2].abs_diff(50) <= 1);
        assert_eq!(*chip.get_pixel(10, 145), Rgb([0, 0, 0]));
    }
}
