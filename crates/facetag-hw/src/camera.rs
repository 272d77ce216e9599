//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("stream not started")]
    NotStreaming,
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// 16-bit little-endian grayscale (2 bytes/pixel).
    Y16,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 device and ask for `width`×`height` YUYV.
    ///
    /// The driver may negotiate a different size or GREY/Y16; the negotiated
    /// values end up in `width`, `height` and `fourcc`.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(device_path.to_string())
            }
            _ if e.to_string().contains("busy") || e.to_string().contains("EBUSY") => {
                CameraError::DeviceBusy
            }
            _ => CameraError::DeviceNotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Capture `skip + 1` frames and return the last one as RGB.
    ///
    /// Skipped frames give the sensor's auto exposure time to settle.
    pub fn capture_frame(&self, skip: usize) -> Result<Frame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        for _ in 0..skip {
            stream.next().map_err(|e| {
                CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
            })?;
        }

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let rgb = self.buf_to_rgb(buf)?;

        Ok(Frame {
            data: rgb,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }

    fn buf_to_rgb(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_rgb(buf, self.width, self.height),
            PixelFormat::Y16 => frame::y16_to_rgb(buf, self.width, self.height),
        };
        converted.map_err(|e| {
            CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format))
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}
