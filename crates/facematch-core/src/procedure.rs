//! The face match decision procedure.
//!
//! LoadImage ×2 → Extract ×2 → (no face? stop) → Distance → Decide.
//! Image sources and the embedder are passed in, so the procedure itself
//! touches no model or device state.

use crate::decision::MatchVerdict;
use crate::error::MatchError;
use crate::source::ImageSource;
use crate::types::FaceDescriptor;
use image::RgbImage;
use serde::Serialize;
use std::fmt;

/// Produces descriptors (box, landmarks, embedding) for every face in an image.
pub trait FaceEmbedder {
    /// Faces sorted most prominent first; empty when none is found.
    fn extract(&mut self, image: &RgbImage) -> Result<Vec<FaceDescriptor>, MatchError>;
}

/// Which input(s) of a comparison lacked a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    First,
    Second,
    Both,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::First => f.write_str("the first image"),
            Side::Second => f.write_str("the second image"),
            Side::Both => f.write_str("either image"),
        }
    }
}

/// Result of a completed comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Comparison {
    /// At least one image had no detectable face; no distance was computed.
    NoFace { missing: Side },
    Match(MatchVerdict),
}

/// Compare the first face found in `first` with the first face found in `second`.
pub fn compare_faces(
    first: &mut dyn ImageSource,
    second: &mut dyn ImageSource,
    embedder: &mut dyn FaceEmbedder,
    threshold: f32,
) -> Result<Comparison, MatchError> {
    let first_image = first.load()?;
    let second_image = second.load()?;

    let first_faces = extract_logged(embedder, &first_image, &first.describe())?;
    let second_faces = extract_logged(embedder, &second_image, &second.describe())?;

    let (a, b) = match (first_faces.first(), second_faces.first()) {
        (Some(a), Some(b)) => (a, b),
        (None, None) => return Ok(Comparison::NoFace { missing: Side::Both }),
        (None, Some(_)) => return Ok(Comparison::NoFace { missing: Side::First }),
        (Some(_), None) => return Ok(Comparison::NoFace { missing: Side::Second }),
    };

    let verdict = MatchVerdict::compare(&a.embedding, &b.embedding, threshold)?;
    tracing::info!(
        distance = verdict.distance,
        threshold,
        same_person = verdict.same_person,
        "faces compared"
    );
    Ok(Comparison::Match(verdict))
}

fn extract_logged(
    embedder: &mut dyn FaceEmbedder,
    image: &RgbImage,
    label: &str,
) -> Result<Vec<FaceDescriptor>, MatchError> {
    let faces = embedder.extract(image)?;
    tracing::info!(source = label, faces = faces.len(), "extracted faces");
    if tracing::enabled!(tracing::Level::DEBUG) {
        match serde_json::to_string(&faces) {
            Ok(json) => tracing::debug!(source = label, detections = %json, "detections"),
            Err(e) => tracing::debug!(error = %e, "could not serialize detections"),
        }
    }
    Ok(faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::MATCH_THRESHOLD;
    use crate::error::{ImageLoadError, SourceError};
    use crate::types::{BoundingBox, Embedding};
    use image::Rgb;
    use std::collections::HashMap;

    /// Serves a solid-colour image; the red channel identifies the "person".
    struct ColourSource(u8);

    impl ImageSource for ColourSource {
        fn describe(&self) -> String {
            format!("colour {}", self.0)
        }

        fn load(&mut self) -> Result<RgbImage, SourceError> {
            Ok(RgbImage::from_pixel(8, 8, Rgb([self.0, 0, 0])))
        }
    }

    struct MissingSource;

    impl ImageSource for MissingSource {
        fn describe(&self) -> String {
            "missing.jpg".into()
        }

        fn load(&mut self) -> Result<RgbImage, SourceError> {
            Err(ImageLoadError::NotFound("missing.jpg".into()).into())
        }
    }

    /// Maps the red channel of an image to a fixed embedding; unknown colours have no face.
    struct TableEmbedder {
        people: HashMap<u8, Vec<f32>>,
        calls: usize,
    }

    impl TableEmbedder {
        fn new(people: &[(u8, Vec<f32>)]) -> Self {
            Self {
                people: people.iter().cloned().collect(),
                calls: 0,
            }
        }
    }

    impl FaceEmbedder for TableEmbedder {
        fn extract(&mut self, image: &RgbImage) -> Result<Vec<FaceDescriptor>, MatchError> {
            self.calls += 1;
            let key = image.get_pixel(0, 0)[0];
            Ok(self
                .people
                .get(&key)
                .map(|values| {
                    vec![FaceDescriptor {
                        face: BoundingBox {
                            x: 0.0,
                            y: 0.0,
                            width: 8.0,
                            height: 8.0,
                            confidence: 0.99,
                            keypoints: None,
                        },
                        landmarks: Vec::new(),
                        embedding: Embedding::new(values.clone()),
                    }]
                })
                .unwrap_or_default())
        }
    }

    fn people() -> TableEmbedder {
        TableEmbedder::new(&[
            (1, vec![1.0, 0.0, 0.0]),
            (2, vec![0.0, 1.0, 0.0]),
            (3, vec![0.9, 0.1, 0.0]),
            (9, vec![0.0; 5]),
        ])
    }

    fn compare_colours(first: u8, second: u8, threshold: f32) -> Result<Comparison, MatchError> {
        let mut embedder = people();
        compare_faces(
            &mut ColourSource(first),
            &mut ColourSource(second),
            &mut embedder,
            threshold,
        )
    }

    #[test]
    fn test_same_image_twice_is_same_person() {
        let result = compare_colours(1, 1, MATCH_THRESHOLD).unwrap();
        match result {
            Comparison::Match(v) => {
                assert_eq!(v.distance, 0.0);
                assert!(v.same_person);
            }
            other => panic!("expected a verdict, got {other:?}"),
        }
    }

    #[test]
    fn test_distinct_people_are_different() {
        let result = compare_colours(1, 2, MATCH_THRESHOLD).unwrap();
        match result {
            Comparison::Match(v) => {
                assert!(v.distance > MATCH_THRESHOLD);
                assert!(!v.same_person);
            }
            other => panic!("expected a verdict, got {other:?}"),
        }
    }

    #[test]
    fn test_close_embeddings_match() {
        let result = compare_colours(1, 3, MATCH_THRESHOLD).unwrap();
        assert!(matches!(result, Comparison::Match(v) if v.same_person));
    }

    #[test]
    fn test_faceless_image_reports_no_face() {
        let result = compare_colours(0, 1, MATCH_THRESHOLD).unwrap();
        assert_eq!(result, Comparison::NoFace { missing: Side::First });

        let result = compare_colours(1, 0, MATCH_THRESHOLD).unwrap();
        assert_eq!(result, Comparison::NoFace { missing: Side::Second });

        let result = compare_colours(0, 0, MATCH_THRESHOLD).unwrap();
        assert_eq!(result, Comparison::NoFace { missing: Side::Both });
    }

    #[test]
    fn test_mismatched_dimensions_are_invalid() {
        let err = compare_colours(1, 9, MATCH_THRESHOLD).unwrap_err();
        assert!(matches!(err, MatchError::InvalidEmbedding { left: 3, right: 5 }));
    }

    #[test]
    fn test_image_error_stops_before_extraction() {
        let mut embedder = people();
        let err = compare_faces(
            &mut ColourSource(1),
            &mut MissingSource,
            &mut embedder,
            MATCH_THRESHOLD,
        )
        .unwrap_err();
        assert!(matches!(err, MatchError::ImageLoad(ImageLoadError::NotFound(_))));
        assert_eq!(embedder.calls, 0);
    }

    #[test]
    fn test_threshold_is_honoured() {
        let result = compare_colours(1, 2, 1.5).unwrap();
        assert!(matches!(result, Comparison::Match(v) if v.same_person));
    }

    #[test]
    fn test_comparison_serializes_with_outcome_tag() {
        let json = serde_json::to_value(Comparison::NoFace { missing: Side::Second }).unwrap();
        assert_eq!(json["outcome"], "no_face");
        assert_eq!(json["missing"], "second");
    }
}
