//! Stream abstraction over capture devices.

use crate::frame::Frame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("no camera found: {0}")]
    DeviceNotFound(String),
    #[error("camera is in use by another application")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("stream stopped")]
    Stopped,
}

/// What a caller asks for when opening a stream. Video only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// What the device actually delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
}

/// A source of video streams.
pub trait VideoDevice: Send + Sync {
    fn open_stream(&self, constraints: &StreamConstraints)
        -> Result<Box<dyn VideoStream>, CameraError>;
}

/// A live video stream. Dropping or stopping it releases the device.
pub trait VideoStream: Send {
    fn settings(&self) -> &StreamSettings;

    /// Block until the next frame arrives.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Release the device. Idempotent.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}
