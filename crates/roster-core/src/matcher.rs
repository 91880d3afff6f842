//! Nearest-identity matching over a gallery snapshot.

use crate::gallery::GallerySnapshot;
use crate::types::{Embedding, MatchResult};

/// Distances closer than this are treated as equal; the earlier identity wins.
pub const TIE_EPSILON: f32 = 1e-6;

/// Convert a configured confidence requirement into a distance threshold.
///
/// Stricter confidence produces a tighter threshold: `0.6` → `0.4`.
pub fn threshold_from_confidence(confidence_threshold: f32) -> f32 {
    1.0 - confidence_threshold
}

/// Strategy for comparing a probe embedding against a gallery snapshot.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, snapshot: &GallerySnapshot, threshold: f32) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
///
/// Scans every identity in snapshot order. Entries whose dimension differs
/// from the probe are not comparable and are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, snapshot: &GallerySnapshot, threshold: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, identity) in snapshot.identities().iter().enumerate() {
            if identity.embedding.dim() != probe.dim() {
                continue;
            }
            let dist = probe.euclidean_distance(&identity.embedding);
            if dist < best_dist - TIE_EPSILON {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= threshold => {
                let identity = &snapshot.identities()[idx];
                MatchResult::Matched {
                    identity_id: identity.id.clone(),
                    display_name: identity.display_name.clone(),
                    distance: best_dist,
                    confidence: (1.0 - best_dist).clamp(0.0, 1.0),
                }
            }
            Some(_) => MatchResult::Unknown {
                nearest_distance: Some(best_dist),
            },
            None => MatchResult::Unknown {
                nearest_distance: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn identity(id: &str, name: &str, values: Vec<f32>) -> Identity {
        Identity {
            id: id.into(),
            display_name: name.into(),
            embedding: Embedding::new(values),
        }
    }

    fn snapshot(identities: Vec<Identity>) -> GallerySnapshot {
        GallerySnapshot::new(1, identities)
    }

    #[test]
    fn test_threshold_from_confidence() {
        assert!((threshold_from_confidence(0.6) - 0.4).abs() < 1e-6);
        assert!(threshold_from_confidence(0.9) < threshold_from_confidence(0.6));
    }

    #[test]
    fn test_match_within_threshold() {
        let gallery = snapshot(vec![identity("a1", "Alice", vec![0.0, 0.0, 0.0])]);
        let probe = Embedding::new(vec![0.3, 0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, threshold_from_confidence(0.6));
        assert_eq!(result.identity_id(), Some("a1"));
        assert!((result.confidence() - 0.7).abs() < 1e-6);
        match result {
            MatchResult::Matched { display_name, distance, .. } => {
                assert_eq!(display_name, "Alice");
                assert!((distance - 0.3).abs() < 1e-6);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_match_beyond_threshold_is_unknown() {
        let gallery = snapshot(vec![identity("a1", "Alice", vec![0.0, 0.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.5, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, threshold_from_confidence(0.6));
        assert!(!result.is_match());
        assert_eq!(result.confidence(), 0.0);
        assert!((result.distance().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_snapshot_is_unknown() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &GallerySnapshot::empty(), 1.0);
        assert_eq!(result, MatchResult::Unknown { nearest_distance: None });
    }

    #[test]
    fn test_nearest_identity_wins_regardless_of_position() {
        let gallery = snapshot(vec![
            identity("1", "decoy1", vec![1.0, 0.0]),
            identity("2", "decoy2", vec![0.0, 1.0]),
            identity("3", "target", vec![0.1, 0.1]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert_eq!(result.identity_id(), Some("3"));
    }

    #[test]
    fn test_tie_break_first_in_snapshot_order() {
        let gallery = snapshot(vec![
            identity("first", "First", vec![0.2, 0.0]),
            identity("second", "Second", vec![-0.2, 0.0]),
            identity("third", "Third", vec![0.0, 0.2]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert_eq!(result.identity_id(), Some("first"));
    }

    #[test]
    fn test_loosening_threshold_never_changes_choice() {
        let gallery = snapshot(vec![
            identity("a", "A", vec![0.0, 0.45]),
            identity("b", "B", vec![0.35, 0.0]),
            identity("c", "C", vec![0.9, 0.9]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);

        let mut previous: Option<String> = None;
        for step in 0..=20 {
            let threshold = step as f32 * 0.05;
            let result = EuclideanMatcher.compare(&probe, &gallery, threshold);
            if let Some(prev) = &previous {
                assert_eq!(result.identity_id(), Some(prev.as_str()), "threshold {threshold}");
            }
            if let Some(id) = result.identity_id() {
                assert_eq!(id, "b");
                previous = Some(id.to_string());
            }
        }
        assert_eq!(previous.as_deref(), Some("b"));
    }

    #[test]
    fn test_dimension_mismatch_skipped() {
        let gallery = snapshot(vec![
            identity("short", "Short", vec![0.0]),
            identity("ok", "Ok", vec![0.1, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert_eq!(result.identity_id(), Some("ok"));
    }

    #[test]
    fn test_confidence_clamped_at_zero() {
        let gallery = snapshot(vec![identity("far", "Far", vec![2.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 3.0);
        assert!(result.is_match());
        assert_eq!(result.confidence(), 0.0);
    }
}
