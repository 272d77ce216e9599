//! facetag-core — Face detection, recognition and labeled matching.
//!
//! Uses SCRFD for face detection and ArcFace for embeddings, both running
//! via ONNX Runtime, and matches embeddings against labeled reference
//! descriptors by Euclidean distance.

use std::path::PathBuf;

pub mod alignment;
pub mod analyzer;
pub mod config;
pub mod descriptors;
pub mod detector;
pub mod error;
pub mod image_io;
pub mod overlay;
pub mod recognizer;
pub mod service;
pub mod tensor;
pub mod types;

pub use analyzer::{FaceAnalyzer, OnnxAnalyzer};
pub use config::Config;
pub use descriptors::{DescriptorBatch, DescriptorFailure};
pub use error::FaceError;
pub use image_io::{ImageDirs, ImageSource};
pub use overlay::OverlayRenderer;
pub use service::{extract_known_labels, match_all, FaceService, Recognition};
pub use tensor::ImageTensor;
pub use types::{BoundingBox, Detection, Embedding, LabeledDescriptor, MatchResult, UNKNOWN_LABEL};

/// `$XDG_DATA_HOME/facetag/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facetag")
        .join("models")
}
