//! Detection and matching against labeled descriptors.

use crate::analyzer::{FaceAnalyzer, OnnxAnalyzer};
use crate::config::Config;
use crate::error::FaceError;
use crate::image_io::{ImageDirs, ImageSource};
use crate::tensor::ImageTensor;
use crate::types::{Detection, EuclideanMatcher, LabeledDescriptor, MatchResult, Matcher};
use std::sync::Arc;

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.8;
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;

/// Shared face pipeline context: the loaded analyzer plus detection and
/// matching settings. Clones share the same analyzer.
#[derive(Clone)]
pub struct FaceService {
    analyzer: Arc<dyn FaceAnalyzer>,
    dirs: ImageDirs,
    min_confidence: f32,
    distance_threshold: f32,
}

/// A target image together with what was found in it.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub image: ImageTensor,
    pub detections: Vec<Detection>,
    /// One entry per detection, same order.
    pub matches: Vec<MatchResult>,
}

impl Recognition {
    pub fn known_labels(&self) -> Vec<String> {
        extract_known_labels(&self.matches)
    }
}

impl FaceService {
    pub fn new(analyzer: Arc<dyn FaceAnalyzer>, dirs: ImageDirs) -> Self {
        Self {
            analyzer,
            dirs,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }

    /// Load the ONNX models named by `config` and apply its thresholds.
    pub fn from_config(config: &Config) -> Result<Self, FaceError> {
        let analyzer = OnnxAnalyzer::load(&config.model_dir)?;
        Ok(Self::new(Arc::new(analyzer), config.image_dirs())
            .with_min_confidence(config.min_confidence)
            .with_distance_threshold(config.distance_threshold))
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_distance_threshold(mut self, distance_threshold: f32) -> Self {
        self.distance_threshold = distance_threshold;
        self
    }

    pub fn dirs(&self) -> &ImageDirs {
        &self.dirs
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    pub fn load_image(&self, source: &ImageSource) -> Result<ImageTensor, FaceError> {
        Ok(source.load(&self.dirs)?)
    }

    /// All faces above the minimum confidence, best first. Empty when none.
    pub fn detect_all(&self, image: &ImageTensor) -> Result<Vec<Detection>, FaceError> {
        let detections = self.analyzer.analyze(image, self.min_confidence)?;
        tracing::debug!(
            faces = detections.len(),
            min_confidence = self.min_confidence,
            "detection complete"
        );
        Ok(detections)
    }

    /// The single highest-confidence face.
    pub fn detect_single(&self, image: &ImageTensor) -> Result<Detection, FaceError> {
        self.detect_all(image)?
            .into_iter()
            .max_by(|a, b| {
                a.bbox
                    .confidence
                    .partial_cmp(&b.bbox.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or(FaceError::NotFound {
                min_confidence: self.min_confidence,
            })
    }

    /// [`match_all`] with the configured distance threshold.
    pub fn match_all(
        &self,
        detections: &[Detection],
        descriptors: &[LabeledDescriptor],
    ) -> Vec<MatchResult> {
        match_all(detections, descriptors, self.distance_threshold)
    }

    /// Load `source`, detect every face and match each one.
    pub fn recognize(
        &self,
        source: &ImageSource,
        descriptors: &[LabeledDescriptor],
    ) -> Result<Recognition, FaceError> {
        let image = self.load_image(source)?;
        let detections = self.detect_all(&image)?;
        let matches = self.match_all(&detections, descriptors);

        tracing::info!(
            source = %source,
            faces = detections.len(),
            known = matches.iter().filter(|m| m.is_known()).count(),
            "recognition complete"
        );

        Ok(Recognition {
            image,
            detections,
            matches,
        })
    }
}

/// Match every detection against `descriptors`, one result per detection in order.
///
/// A detection whose nearest descriptor is farther than `threshold` is
/// labeled "unknown". Equal distances resolve to the earlier descriptor.
pub fn match_all(
    detections: &[Detection],
    descriptors: &[LabeledDescriptor],
    threshold: f32,
) -> Vec<MatchResult> {
    detections
        .iter()
        .map(|d| EuclideanMatcher.best_match(&d.embedding, descriptors, threshold))
        .collect()
}

/// Labels of known matches, in order.
pub fn extract_known_labels(matches: &[MatchResult]) -> Vec<String> {
    matches
        .iter()
        .filter(|m| m.is_known())
        .map(|m| m.label.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::stub::{tiles, TileAnalyzer};
    use crate::types::{Embedding, UNKNOWN_LABEL};

    const RED: [u8; 3] = [255, 0, 0];
    const GREEN: [u8; 3] = [0, 255, 0];
    const BLUE: [u8; 3] = [0, 0, 255];

    fn service(confidence: f32) -> FaceService {
        FaceService::new(Arc::new(TileAnalyzer { confidence }), ImageDirs::default())
    }

    fn descriptor(label: &str, values: Vec<f32>) -> LabeledDescriptor {
        LabeledDescriptor {
            label: label.into(),
            embedding: Embedding::new(values),
        }
    }

    fn result(label: &str) -> MatchResult {
        MatchResult {
            label: label.into(),
            distance: 0.1,
        }
    }

    #[test]
    fn test_detect_all_no_faces_is_empty() {
        let image = tiles(8, &[[0, 0, 0]]);
        assert!(service(0.9).detect_all(&image).unwrap().is_empty());
    }

    #[test]
    fn test_detect_all_below_min_confidence_is_empty() {
        let image = tiles(8, &[RED]);
        assert!(service(0.7).detect_all(&image).unwrap().is_empty());
        assert_eq!(service(0.7).with_min_confidence(0.5).detect_all(&image).unwrap().len(), 1);
    }

    #[test]
    fn test_detect_single_not_found() {
        let image = tiles(8, &[[0, 0, 0]]);
        let err = service(0.9).detect_single(&image).unwrap_err();
        assert!(matches!(err, FaceError::NotFound { .. }));
    }

    #[test]
    fn test_match_all_one_result_per_detection_in_order() {
        let svc = service(0.9);
        let image = tiles(8, &[BLUE, RED, GREEN]);
        let detections = svc.detect_all(&image).unwrap();
        let descriptors = vec![
            descriptor("red", vec![1.0, 0.0, 0.0]),
            descriptor("green", vec![0.0, 1.0, 0.0]),
        ];

        let matches = svc.match_all(&detections, &descriptors);
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].label, UNKNOWN_LABEL);
        assert_eq!(matches[1].label, "red");
        assert_eq!(matches[2].label, "green");
    }

    #[test]
    fn test_match_all_threshold_boundary() {
        let detection = Detection {
            bbox: crate::types::BoundingBox {
                x: 0.0, y: 0.0, width: 1.0, height: 1.0, confidence: 1.0, landmarks: None,
            },
            embedding: Embedding::new(vec![0.0, 0.5]),
        };
        let descriptors = vec![descriptor("a", vec![0.0, 0.0])];

        assert_eq!(match_all(&[detection.clone()], &descriptors, 0.5)[0].label, "a");
        assert_eq!(match_all(&[detection], &descriptors, 0.49)[0].label, UNKNOWN_LABEL);
    }

    #[test]
    fn test_match_all_empty_descriptors() {
        let svc = service(0.9);
        let detections = svc.detect_all(&tiles(8, &[RED])).unwrap();
        let matches = svc.match_all(&detections, &[]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].label, UNKNOWN_LABEL);
    }

    #[test]
    fn test_extract_known_labels_preserves_order() {
        let matches = vec![
            result("b"),
            result(UNKNOWN_LABEL),
            result("a"),
            result(UNKNOWN_LABEL),
            result("b"),
        ];
        assert_eq!(extract_known_labels(&matches), vec!["b", "a", "b"]);
    }

    #[test]
    fn test_extract_known_labels_idempotent() {
        let matches = vec![result("x"), result(UNKNOWN_LABEL), result("y")];
        let once = extract_known_labels(&matches);
        let again: Vec<MatchResult> = once.iter().map(|l| result(l)).collect();
        assert_eq!(extract_known_labels(&again), once);
    }

    #[test]
    fn test_recognize_from_data_uri() {
        let svc = service(0.9);
        let jpeg = tiles(16, &[RED, [0, 0, 0]]).encode_jpeg(100).unwrap();
        let source = ImageSource::from_bytes("image/jpeg", jpeg);

        let descriptors = vec![descriptor("red", vec![1.0, 0.0, 0.0])];
        let recognition = svc.recognize(&source, &descriptors).unwrap();

        assert_eq!(recognition.image.shape(), (16, 32, 3));
        assert_eq!(recognition.detections.len(), recognition.matches.len());
        assert_eq!(recognition.known_labels(), vec!["red"]);
    }
}
