//! The face analysis capability: detection plus per-face embedding.
//!
//! [`FaceAnalyzer`] is the seam between the orchestration layer and the
//! inference backend. [`OnnxAnalyzer`] is the production backend (SCRFD +
//! ArcFace); tests substitute a deterministic stub.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::tensor::ImageTensor;
use crate::types::Detection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detects faces and computes an embedding for each one.
pub trait FaceAnalyzer: Send + Sync {
    /// Faces scoring at least `min_confidence`, best first. No faces is `Ok(vec![])`.
    fn analyze(
        &self,
        image: &ImageTensor,
        min_confidence: f32,
    ) -> Result<Vec<Detection>, AnalyzerError>;
}

/// SCRFD detection followed by ArcFace embedding, both on ONNX Runtime.
///
/// Sessions are loaded once and then only read; the mutexes serialize
/// `Session::run`, which needs exclusive access.
pub struct OnnxAnalyzer {
    detector: Mutex<FaceDetector>,
    recognizer: Mutex<FaceRecognizer>,
}

impl OnnxAnalyzer {
    /// Load `det_10g.onnx` and `w600k_r50.onnx` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, AnalyzerError> {
        let (scrfd_path, arcface_path) = model_paths(model_dir);

        let detector = FaceDetector::load(&scrfd_path)?;
        tracing::info!(path = %scrfd_path.display(), "SCRFD detector loaded");

        let recognizer = FaceRecognizer::load(&arcface_path)?;
        tracing::info!(path = %arcface_path.display(), "ArcFace recognizer loaded");

        Ok(Self {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
        })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn analyze(
        &self,
        image: &ImageTensor,
        min_confidence: f32,
    ) -> Result<Vec<Detection>, AnalyzerError> {
        let faces = lock(&self.detector).detect(image, min_confidence)?;

        if faces.is_empty() {
            return Ok(Vec::new());
        }

        let mut recognizer = lock(&self.recognizer);

        faces
            .into_iter()
            .map(|bbox| -> Result<Detection, AnalyzerError> {
                let embedding = recognizer.extract(image, &bbox)?;
                Ok(Detection { bbox, embedding })
            })
            .collect()
    }
}

/// Sessions carry no state between runs, so a lock poisoned by a panicked
/// call is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Paths of the detection and recognition models inside `model_dir`.
pub fn model_paths(model_dir: &Path) -> (PathBuf, PathBuf) {
    (
        model_dir.join(SCRFD_MODEL_FILE),
        model_dir.join(ARCFACE_MODEL_FILE),
    )
}


#[cfg(test)]
mod tests {
    use super::stub::{tiles, TileAnalyzer};
    use super::*;

    #[test]
    fn test_model_paths() {
        let (det, rec) = model_paths(Path::new("/models"));
        assert_eq!(det, PathBuf::from("/models/det_10g.onnx"));
        assert_eq!(rec, PathBuf::from("/models/w600k_r50.onnx"));
    }

    #[test]
    fn test_load_missing_models_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxAnalyzer::load(dir.path());
        assert!(matches!(
            result,
            Err(AnalyzerError::Detector(DetectorError::ModelNotFound(_)))
        ));
    }

    #[test]
    fn test_lock_recovers_after_panic() {
        let mutex = std::sync::Arc::new(Mutex::new(7u32));
        let shared = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*lock(&mutex), 7);
    }

    #[test]
    fn test_stub_finds_non_black_tiles() {
        let image = tiles(10, &[[255, 0, 0], [0, 0, 0], [0, 255, 0]]);
        let faces = TileAnalyzer { confidence: 0.9 }.analyze(&image, 0.8).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].embedding.values, vec![1.0, 0.0, 0.0]);
        assert_eq!(faces[1].bbox.x, 20.0);
    }

    #[test]
    fn test_stub_respects_min_confidence() {
        let image = tiles(10, &[[255, 0, 0]]);
        let faces = TileAnalyzer { confidence: 0.5 }.analyze(&image, 0.8).unwrap();
        assert!(faces.is_empty());
    }
}
