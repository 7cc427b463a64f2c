//! Face extraction boundary.
//!
//! The matching pipelines consume embeddings through the [`FaceEmbedder`]
//! trait; the ONNX-backed implementation lives in [`detector`]. Distances are
//! plain euclidean over embedding space.

pub mod detector;

use anyhow::Result;
use image::DynamicImage;

pub use detector::OnnxEmbedder;

/// Extracts identity embeddings from images. Implementations must never
/// treat "no face found" as an error; that is an empty result.
pub trait FaceEmbedder {
    /// All face embeddings found in the image, in detection order.
    fn detect_and_embed(&self, img: &DynamicImage) -> Result<Vec<Vec<f32>>>;

    /// Embedding of the first detected face, for single-subject probe photos.
    fn embed_single_face(&self, img: &DynamicImage) -> Result<Option<Vec<f32>>> {
        Ok(self.detect_and_embed(img)?.into_iter().next())
    }
}

/// Euclidean distance between two embeddings. Mismatched lengths compare as
/// maximally distant.
pub fn embedding_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Distance from the probe to each candidate, one per candidate, lower is
/// more similar.
pub fn face_distances(candidates: &[Vec<f32>], probe: &[f32]) -> Vec<f32> {
    candidates
        .iter()
        .map(|c| embedding_distance(c, probe))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((embedding_distance(&a, &b) - 5.0).abs() < 1e-6);
        assert!((embedding_distance(&a, &a)).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_lengths_are_max_distant() {
        assert_eq!(embedding_distance(&[1.0], &[1.0, 2.0]), f32::MAX);
    }

    #[test]
    fn test_face_distances_order() {
        let probe = vec![0.0];
        let candidates = vec![vec![0.5], vec![0.25]];
        let distances = face_distances(&candidates, &probe);
        assert!((distances[0] - 0.5).abs() < 1e-6);
        assert!((distances[1] - 0.25).abs() < 1e-6);
    }
}
