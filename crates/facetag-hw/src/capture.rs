//! Camera stream to still-image snapshots.

use crate::camera::{Camera, CameraError};
use crate::frame::{self, Frame};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

/// What to open and what size snapshots should be.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Frames discarded before each snapshot.
    pub warmup_frames: usize,
    pub jpeg_quality: u8,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            warmup_frames: 4,
            jpeg_quality: 90,
        }
    }
}

/// An encoded still image.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Snapshot {
    /// `data:image/jpeg;base64,...`
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

/// Holds a camera stream open and turns its current frame into snapshots.
pub struct CaptureAdapter {
    constraints: CaptureConstraints,
    camera: Option<Camera>,
}

impl CaptureAdapter {
    pub fn new(constraints: CaptureConstraints) -> Self {
        Self {
            constraints,
            camera: None,
        }
    }

    /// Open the configured device. Failures are logged, not returned;
    /// the result says whether a stream is live.
    pub fn start_stream(&mut self) -> bool {
        if self.camera.is_some() {
            return true;
        }

        match Camera::open(&self.constraints.device, self.constraints.width, self.constraints.height) {
            Ok(camera) => {
                self.camera = Some(camera);
                true
            }
            Err(err) => {
                tracing::warn!(
                    device = %self.constraints.device,
                    error = %err,
                    "camera stream unavailable"
                );
                false
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.camera.is_some()
    }

    pub fn stop_stream(&mut self) {
        if self.camera.take().is_some() {
            tracing::debug!(device = %self.constraints.device, "camera stream stopped");
        }
    }

    /// Grab the current frame, sized to the constraints, as JPEG.
    pub fn take_picture(&self) -> Result<Snapshot, CameraError> {
        let camera = self.camera.as_ref().ok_or(CameraError::NotStreaming)?;
        let frame = camera.capture_frame(self.constraints.warmup_frames)?;

        if frame::is_dark_frame(&frame.data, 0.95) {
            tracing::warn!(
                sequence = frame.sequence,
                brightness = frame.avg_brightness(),
                "captured frame is almost entirely dark"
            );
        }

        encode_snapshot(
            &frame,
            self.constraints.width,
            self.constraints.height,
            self.constraints.jpeg_quality,
        )
    }
}

/// Resize `frame` to `width`×`height` when needed and JPEG-encode it.
pub fn encode_snapshot(
    frame: &Frame,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Snapshot, CameraError> {
    let img = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(|| {
        CameraError::CaptureFailed(format!(
            "frame buffer of {} bytes does not fit {}x{} RGB",
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })?;

    let img = if img.dimensions() != (width, height) {
        image::imageops::resize(&img, width, height, FilterType::Triangle)
    } else {
        img
    };

    let mut jpeg = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)))?;

    tracing::debug!(width, height, bytes = jpeg.len(), "snapshot encoded");
    Ok(Snapshot {
        jpeg,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        Frame {
            data: vec![120; (width * height * 3) as usize],
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 7,
        }
    }

    #[test]
    fn test_encode_snapshot_resizes_to_constraints() {
        let snapshot = encode_snapshot(&frame(64, 36), 32, 24, 80).unwrap();
        let decoded = image::load_from_memory(&snapshot.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
        assert_eq!((snapshot.width, snapshot.height), (32, 24));
    }

    #[test]
    fn test_encode_snapshot_rejects_short_buffer() {
        let mut short = frame(8, 8);
        short.data.truncate(10);
        assert!(matches!(
            encode_snapshot(&short, 8, 8, 80),
            Err(CameraError::CaptureFailed(_))
        ));
    }

    #[test]
    fn test_data_uri_prefix() {
        let snapshot = encode_snapshot(&frame(8, 8), 8, 8, 80).unwrap();
        let uri = snapshot.to_data_uri();
        assert!(uri.starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn test_start_stream_missing_device_is_silent() {
        let mut adapter = CaptureAdapter::new(CaptureConstraints {
            device: "/dev/video-does-not-exist".into(),
            ..CaptureConstraints::default()
        });
        assert!(!adapter.start_stream());
        assert!(!adapter.is_streaming());
        assert!(matches!(adapter.take_picture(), Err(CameraError::NotStreaming)));
    }
}
