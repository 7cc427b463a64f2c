//! Match scoring policy.
//!
//! Confidence is `(1 - best_distance) * 100`, where best_distance is the
//! minimum euclidean distance from the probe to any candidate encoding of a
//! case. The value is deliberately unclamped; callers threshold on it raw.

pub mod cache;

pub use cache::EncodingCache;

use crate::faces::face_distances;

/// A case that cleared the threshold for one report, pending persistence.
#[derive(Debug, Clone)]
pub struct CandidateMatch {
    pub case_id: i64,
    pub confidence: f64,
    /// The case's first reference photo, not necessarily the one that
    /// produced the best distance. Preserved from the original policy.
    pub matched_photo: String,
}

/// Score a probe against one case's candidate set.
///
/// An empty probe (no face extracted) or an empty candidate set scores 0.0;
/// degenerate input is never an error.
pub fn match_confidence(candidates: &[Vec<f32>], probe: &[f32]) -> f64 {
    if probe.is_empty() || candidates.is_empty() {
        return 0.0;
    }

    let best_distance = face_distances(candidates, probe)
        .into_iter()
        .fold(f32::INFINITY, f32::min);

    (1.0 - best_distance as f64) * 100.0
}

/// Decision rule: a case matches when confidence clears the configured
/// fraction-of-100 threshold.
pub fn is_match(confidence: f64, threshold: f64) -> bool {
    confidence >= threshold * 100.0
}
