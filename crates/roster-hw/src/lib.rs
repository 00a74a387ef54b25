//! roster-hw: Video capture for face enrollment and face login.
//!
//! Exposes a small stream abstraction ([`VideoDevice`] / [`VideoStream`])
//! and its V4L2 implementation.

pub mod camera;
pub mod device;
pub mod frame;

pub use camera::{DeviceInfo, PixelFormat, V4lDevice};
pub use device::{CameraError, StreamConstraints, StreamSettings, VideoDevice, VideoStream};
pub use frame::Frame;
