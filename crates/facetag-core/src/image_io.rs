//! Image loading from file paths or inline data URIs, and JPEG output.

use crate::tensor::ImageTensor;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const DATA_URI_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed image data: {0}")]
    Decode(#[from] image::ImageError),
    #[error("malformed data URI: {0}")]
    InvalidDataUri(String),
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Where an image comes from. Decided once, when the caller's string is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Inline base64 payload, already decoded to raw bytes.
    DataUri { mime: String, bytes: Vec<u8> },
    /// File system path, relative paths resolved against [`ImageDirs::input_dir`].
    Path(PathBuf),
}

impl ImageSource {
    /// Classify `input` as a `data:<mime>;base64,<payload>` URI or a path.
    pub fn parse(input: &str) -> Result<Self, LoadError> {
        let Some(rest) = input.strip_prefix(DATA_URI_SCHEME) else {
            return Ok(Self::Path(PathBuf::from(input)));
        };

        let (mime, payload) = rest
            .split_once(BASE64_MARKER)
            .ok_or_else(|| LoadError::InvalidDataUri("missing ';base64,' marker".into()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| LoadError::InvalidDataUri(e.to_string()))?;

        Ok(Self::DataUri {
            mime: mime.to_string(),
            bytes,
        })
    }

    /// Wrap already-encoded image bytes as a data URI source.
    pub fn from_bytes(mime: &str, bytes: Vec<u8>) -> Self {
        Self::DataUri {
            mime: mime.to_string(),
            bytes,
        }
    }

    /// Read (for paths) and decode into an RGB tensor.
    pub fn load(&self, dirs: &ImageDirs) -> Result<ImageTensor, LoadError> {
        let decoded = match self {
            Self::DataUri { bytes, .. } => image::load_from_memory(bytes)?,
            Self::Path(path) => {
                let path = dirs.resolve(path);
                let bytes = std::fs::read(&path).map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?;
                image::load_from_memory(&bytes)?
            }
        };

        let tensor = ImageTensor::from_rgb(&decoded.to_rgb8());
        tracing::debug!(
            source = %self,
            width = tensor.width(),
            height = tensor.height(),
            "image decoded"
        );
        Ok(tensor)
    }
}

impl FromStr for ImageSource {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataUri { mime, bytes } => write!(f, "data:{mime} ({} bytes)", bytes.len()),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Base directories for image input and output.
#[derive(Debug, Clone)]
pub struct ImageDirs {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ImageDirs {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Resolve a relative input path against `input_dir`; absolute paths pass through.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.input_dir.join(path)
        }
    }

    /// Encode `image` as JPEG and write it to `output_dir/name`.
    pub fn save_jpeg(
        &self,
        name: &str,
        image: &ImageTensor,
        quality: u8,
    ) -> Result<PathBuf, SaveError> {
        let bytes = image.encode_jpeg(quality)?;
        let path = self.output_dir.join(name);

        std::fs::create_dir_all(&self.output_dir).map_err(|source| SaveError::Io {
            path: self.output_dir.clone(),
            source,
        })?;
        std::fs::write(&path, &bytes).map_err(|source| SaveError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "image saved");
        Ok(path)
    }
}

impl Default for ImageDirs {
    fn default() -> Self {
        Self::new(".", "out")
    }
}
