//! facetag-hw — Camera capture for still-image snapshots.
//!
//! Provides V4L2-based camera access and a capture adapter that turns a
//! live stream into JPEG snapshots or data URIs.

pub mod camera;
pub mod capture;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use capture::{CaptureAdapter, CaptureConstraints, Snapshot};
pub use frame::Frame;
