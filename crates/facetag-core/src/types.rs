use serde::{Deserialize, Serialize};

/// Label assigned to a detection that matches no descriptor within threshold.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A reference embedding tagged with the label of the person it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDescriptor {
    pub label: String,
    pub embedding: Embedding,
}

/// One face found in a target image.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Outcome of matching one detection against a set of labeled descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Best label, or [`UNKNOWN_LABEL`].
    pub label: String,
    /// Euclidean distance to the nearest descriptor.
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            distance,
        }
    }

    pub fn is_known(&self) -> bool {
        self.label != UNKNOWN_LABEL
    }
}

/// Strategy for comparing a probe embedding against labeled descriptors.
pub trait Matcher {
    fn best_match(
        &self,
        probe: &Embedding,
        descriptors: &[LabeledDescriptor],
        threshold: f32,
    ) -> MatchResult;
}

/// Nearest-neighbour matcher on Euclidean distance.
///
/// Ties keep the first descriptor encountered, so results depend on the
/// order of the descriptor slice. Descriptors whose dimension differs from
/// the probe's are never compared.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn best_match(
        &self,
        probe: &Embedding,
        descriptors: &[LabeledDescriptor],
        threshold: f32,
    ) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, descriptor) in descriptors.iter().enumerate() {
            if probe.values.is_empty() || descriptor.embedding.values.len() != probe.values.len() {
                tracing::debug!(
                    label = %descriptor.label,
                    expected = probe.values.len(),
                    actual = descriptor.embedding.values.len(),
                    "skipping descriptor with mismatched dimension"
                );
                continue;
            }
            let dist = probe.euclidean_distance(&descriptor.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= threshold => MatchResult {
                label: descriptors[idx].label.clone(),
                distance: best_dist,
            },
            _ => MatchResult::unknown(best_dist),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(label: &str, values: Vec<f32>) -> LabeledDescriptor {
        LabeledDescriptor {
            label: label.into(),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.3, 0.4, 0.5]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_matcher_picks_nearest() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            descriptor("far", vec![0.0, 1.0, 0.0]),
            descriptor("near", vec![0.9, 0.1, 0.0]),
            descriptor("other", vec![0.0, 0.0, 1.0]),
        ];

        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6);
        assert_eq!(result.label, "near");
        assert!(result.is_known());
        assert!(result.distance < 0.2);
    }

    #[test]
    fn test_matcher_beyond_threshold_is_unknown() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![descriptor("other", vec![0.0, 1.0])];

        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6);
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert!(!result.is_known());
        assert!((result.distance - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_matcher_tie_keeps_first() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            descriptor("first", vec![0.1, 0.0]),
            descriptor("second", vec![0.0, 0.1]),
        ];

        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6);
        assert_eq!(result.label, "first");
    }

    #[test]
    fn test_matcher_ignores_empty_descriptor() {
        let probe = Embedding::new(vec![0.9, -0.4, 0.2]);
        let gallery = vec![descriptor("ghost", vec![])];

        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6);
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_matcher_ignores_mismatched_dimension() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            // Shares the probe's first component exactly
            descriptor("short", vec![1.0]),
            descriptor("far", vec![0.0, 1.0, 0.0]),
        ];

        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6);
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert!((result.distance - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_matcher_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher.best_match(&probe, &[], 0.6);
        assert!(!result.is_known());
        assert!(result.distance.is_infinite());
    }
}
