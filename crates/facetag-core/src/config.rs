use crate::image_io::ImageDirs;
use crate::service::{DEFAULT_DISTANCE_THRESHOLD, DEFAULT_MIN_CONFIDENCE};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Pipeline configuration.
///
/// Layered: built-in defaults, then the TOML file named by `FACETAG_CONFIG`
/// (if set), then individual `FACETAG_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// Base directory for relative input image paths.
    pub input_dir: PathBuf,
    /// Directory rendered images are written to.
    pub output_dir: PathBuf,
    /// Minimum detector score for a face to count.
    pub min_confidence: f32,
    /// Maximum Euclidean embedding distance for a labeled match.
    pub distance_threshold: f32,
    /// TrueType font for overlay labels. Labels are skipped when unset.
    pub font_path: Option<PathBuf>,
    pub jpeg_quality: u8,
    /// V4L2 device used by `capture`.
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: crate::default_model_dir(),
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("out"),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            font_path: None,
            jpeg_quality: 90,
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
        }
    }
}

impl Config {
    /// Load defaults, the optional `FACETAG_CONFIG` file, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("FACETAG_CONFIG") {
            Ok(path) => Self::from_file(PathBuf::from(path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    fn with_env_overrides(self) -> Self {
        Self {
            model_dir: env_path("FACETAG_MODEL_DIR").unwrap_or(self.model_dir),
            input_dir: env_path("FACETAG_INPUT_DIR").unwrap_or(self.input_dir),
            output_dir: env_path("FACETAG_OUTPUT_DIR").unwrap_or(self.output_dir),
            min_confidence: env_parse("FACETAG_MIN_CONFIDENCE", self.min_confidence),
            distance_threshold: env_parse("FACETAG_DISTANCE_THRESHOLD", self.distance_threshold),
            font_path: env_path("FACETAG_FONT_PATH").or(self.font_path),
            jpeg_quality: env_parse("FACETAG_JPEG_QUALITY", self.jpeg_quality),
            camera_device: std::env::var("FACETAG_CAMERA_DEVICE").unwrap_or(self.camera_device),
            capture_width: env_parse("FACETAG_CAPTURE_WIDTH", self.capture_width),
            capture_height: env_parse("FACETAG_CAPTURE_HEIGHT", self.capture_height),
        }
    }

    pub fn image_dirs(&self) -> ImageDirs {
        ImageDirs::new(&self.input_dir, &self.output_dir)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
