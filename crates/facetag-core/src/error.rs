use crate::analyzer::AnalyzerError;
use crate::descriptors::StoreError;
use crate::image_io::LoadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("got {labels} labels for {images} images")]
    Validation { labels: usize, images: usize },
    #[error("no face detected above confidence {min_confidence}")]
    NotFound { min_confidence: f32 },
    #[error("io: {0}")]
    Io(#[source] LoadError),
    #[error("decode: {0}")]
    Decode(#[source] LoadError),
    #[error("analyzer: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("descriptor store: {0}")]
    Store(#[from] StoreError),
    #[error("worker task failed: {0}")]
    Task(String),
}

impl From<LoadError> for FaceError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Io { .. } => Self::Io(err),
            LoadError::Decode(_) | LoadError::InvalidDataUri(_) => Self::Decode(err),
        }
    }
}
