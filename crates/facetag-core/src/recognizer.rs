//! ArcFace face recognizer via ONNX Runtime.
//!
//! Extracts 512-dimensional face embeddings from aligned RGB face crops,
//! using the w600k_r50 ArcFace model.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::tensor::ImageTensor;
use crate::types::{BoundingBox, Embedding};
use ndarray::{Array3, Array4};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // NOT 128.0, ArcFace uses symmetric normalization
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download w600k_r50.onnx from insightface into the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Extract an L2-normalized embedding for `face` in `image`.
    ///
    /// The face is aligned to a canonical 112x112 position first, so the
    /// detector must have produced landmarks.
    pub fn extract(
        &mut self,
        image: &ImageTensor,
        face: &BoundingBox,
    ) -> Result<Embedding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;

        let aligned = alignment::align_face(image.view(), landmarks);
        let input = Self::preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }

    /// Convert a 112x112 RGB aligned crop into a NCHW float tensor.
    fn preprocess(aligned_face: &Array3<u8>) -> Array4<f32> {
        let size = ALIGNED_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for y in 0..size {
            for x in 0..size {
                for c in 0..3 {
                    let pixel = aligned_face.get([y, x, c]).copied().unwrap_or(0) as f32;
                    tensor[[0, c, y, x]] = (pixel - ARCFACE_MEAN) / ARCFACE_STD;
                }
            }
        }

        tensor
    }
}

fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_output_shape() {
        let aligned = Array3::<u8>::from_elem((ALIGNED_SIZE, ALIGNED_SIZE, 3), 128);
        let tensor = FaceRecognizer::preprocess(&aligned);
        assert_eq!(tensor.shape(), &[1, 3, ALIGNED_SIZE, ALIGNED_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let aligned = Array3::<u8>::from_elem((ALIGNED_SIZE, ALIGNED_SIZE, 3), 128);
        let tensor = FaceRecognizer::preprocess(&aligned);
        // 128 - 127.5 = 0.5, / 127.5 ≈ 0.00392
        let val = tensor[[0, 0, 0, 0]];
        let expected = (128.0 - ARCFACE_MEAN) / ARCFACE_STD;
        assert!((val - expected).abs() < 1e-6, "got {val}, expected {expected}");
    }

    #[test]
    fn test_preprocess_moves_channels_to_planes() {
        let mut aligned = Array3::<u8>::zeros((ALIGNED_SIZE, ALIGNED_SIZE, 3));
        aligned[[3, 7, 2]] = 255;
        let tensor = FaceRecognizer::preprocess(&aligned);
        assert!((tensor[[0, 2, 3, 7]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 3, 7]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
