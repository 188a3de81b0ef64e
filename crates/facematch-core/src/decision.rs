//! Distance and threshold decision.

use crate::error::MatchError;
use crate::types::Embedding;
use serde::Serialize;

/// Distance at or below which two embeddings belong to the same person.
pub const MATCH_THRESHOLD: f32 = 0.6;

/// Euclidean distance between two embeddings of equal dimensionality.
///
/// Embeddings of different length are rejected, never truncated or padded.
pub fn euclidean_distance(a: &Embedding, b: &Embedding) -> Result<f32, MatchError> {
    if a.dim() != b.dim() {
        return Err(MatchError::InvalidEmbedding {
            left: a.dim(),
            right: b.dim(),
        });
    }

    Ok(a.values
        .iter()
        .zip(b.values.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt())
}

/// Outcome of comparing two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchVerdict {
    pub distance: f32,
    pub threshold: f32,
    pub same_person: bool,
}

impl MatchVerdict {
    /// Apply the threshold rule. The boundary is inclusive of "same person".
    pub fn decide(distance: f32, threshold: f32) -> Self {
        Self {
            distance,
            threshold,
            same_person: distance <= threshold,
        }
    }

    /// Compute the distance between `a` and `b` and decide against `threshold`.
    pub fn compare(a: &Embedding, b: &Embedding, threshold: f32) -> Result<Self, MatchError> {
        let distance = euclidean_distance(a, b)?;
        Ok(Self::decide(distance, threshold))
    }
}
