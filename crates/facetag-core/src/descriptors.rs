//! Building, serializing and persisting labeled reference descriptors.

use crate::error::FaceError;
use crate::image_io::ImageSource;
use crate::service::FaceService;
use crate::types::{Embedding, LabeledDescriptor};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::task::JoinSet;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("descriptor '{label}' has {count} embeddings, expected exactly 1")]
    Malformed { label: String, count: usize },
    #[error("descriptor '{label}' has dimension {actual}, expected {expected}")]
    Dimension {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk form of a [`LabeledDescriptor`]: `{"label": .., "descriptors": [[..]]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDescriptor {
    pub label: String,
    pub descriptors: Vec<Vec<f32>>,
}

/// A reference image that produced no descriptor.
#[derive(Debug)]
pub struct DescriptorFailure {
    /// Position in the input sequences.
    pub index: usize,
    pub label: String,
    pub error: FaceError,
}

/// Output of [`FaceService::build_descriptors`].
///
/// Failed items are left out of `descriptors`, so callers should compare its
/// length against the input or inspect `failures`.
#[derive(Debug, Default)]
pub struct DescriptorBatch {
    /// Successful descriptors, in input order.
    pub descriptors: Vec<LabeledDescriptor>,
    /// Per-item failures, in input order.
    pub failures: Vec<DescriptorFailure>,
}

impl DescriptorBatch {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl FaceService {
    /// Build one descriptor per `(label, image)` pair.
    ///
    /// Mismatched lengths fail before any image is touched. Each pair is then
    /// processed on its own blocking task; an image with no detectable face, or
    /// one whose analysis panics, is reported in [`DescriptorBatch::failures`]
    /// without affecting the others.
    pub async fn build_descriptors(
        &self,
        labels: &[String],
        images: &[ImageSource],
    ) -> Result<DescriptorBatch, FaceError> {
        if labels.len() != images.len() {
            return Err(FaceError::Validation {
                labels: labels.len(),
                images: images.len(),
            });
        }

        let mut tasks = JoinSet::new();
        for (index, (label, source)) in labels.iter().zip(images).enumerate() {
            let service = self.clone();
            let label = label.clone();
            let source = source.clone();
            tasks.spawn_blocking(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| service.describe(&label, &source)))
                    .unwrap_or_else(|payload| Err(FaceError::Task(panic_message(payload.as_ref()))));
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Result<LabeledDescriptor, FaceError>>> =
            (0..labels.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined.map_err(|e| FaceError::Task(e.to_string()))?;
            slots[index] = Some(outcome);
        }

        let mut batch = DescriptorBatch::default();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(descriptor)) => batch.descriptors.push(descriptor),
                Some(Err(error)) => {
                    tracing::warn!(index, label = %labels[index], %error, "no descriptor for reference image");
                    batch.failures.push(DescriptorFailure {
                        index,
                        label: labels[index].clone(),
                        error,
                    });
                }
                None => {
                    return Err(FaceError::Task(format!("no result for item {index}")));
                }
            }
        }

        tracing::info!(
            requested = labels.len(),
            built = batch.descriptors.len(),
            failed = batch.failures.len(),
            "descriptors built"
        );
        Ok(batch)
    }

    /// Load one reference image and take the embedding of its best face.
    fn describe(&self, label: &str, source: &ImageSource) -> Result<LabeledDescriptor, FaceError> {
        let image = self.load_image(source)?;
        let face = self.detect_single(&image)?;
        tracing::debug!(label, confidence = face.bbox.confidence, "reference face selected");

        Ok(LabeledDescriptor {
            label: label.to_string(),
            embedding: face.embedding,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("analysis panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("analysis panicked: {msg}")
    } else {
        "analysis panicked".to_string()
    }
}

/// Flatten descriptors into their persisted form.
pub fn serialize(descriptors: &[LabeledDescriptor]) -> Vec<StoredDescriptor> {
    descriptors
        .iter()
        .map(|d| StoredDescriptor {
            label: d.label.clone(),
            descriptors: vec![d.embedding.values.clone()],
        })
        .collect()
}

/// Rebuild descriptors from their persisted form.
///
/// Every entry must hold exactly one non-empty vector, and all vectors in
/// one file must share the same dimension.
pub fn deserialize(stored: Vec<StoredDescriptor>) -> Result<Vec<LabeledDescriptor>, StoreError> {
    let mut dimension: Option<usize> = None;
    let mut descriptors = Vec::with_capacity(stored.len());

    for entry in stored {
        let count = entry.descriptors.len();
        let mut vectors = entry.descriptors.into_iter();
        let values = match (vectors.next(), count) {
            (Some(values), 1) => values,
            _ => {
                return Err(StoreError::Malformed {
                    label: entry.label,
                    count,
                })
            }
        };

        let expected = *dimension.get_or_insert(values.len());
        if values.is_empty() || values.len() != expected {
            return Err(StoreError::Dimension {
                label: entry.label,
                expected,
                actual: values.len(),
            });
        }

        descriptors.push(LabeledDescriptor {
            label: entry.label,
            embedding: Embedding::new(values),
        });
    }

    Ok(descriptors)
}

/// Write descriptors as pretty-printed JSON, creating parent directories.
pub fn save_json(path: &Path, descriptors: &[LabeledDescriptor]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = serde_json::to_string_pretty(&serialize(descriptors))?;
    std::fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(path = %path.display(), count = descriptors.len(), "descriptors saved");
    Ok(())
}

/// Read descriptors written by [`save_json`].
pub fn load_json(path: &Path) -> Result<Vec<LabeledDescriptor>, StoreError> {
    let json = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptors = deserialize(serde_json::from_str(&json)?)?;
    tracing::debug!(path = %path.display(), count = descriptors.len(), "descriptors loaded");
    Ok(descriptors)
}
