//! V4L2 capture via the `v4l` crate.

use crate::device::{
    CameraError, StreamConstraints, StreamSettings, VideoDevice, VideoStream,
};
use crate::frame::{self, Frame};
use std::io;
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

impl DeviceInfo {
    /// Heuristic for built-in front cameras; V4L2 has no facing metadata.
    pub fn looks_user_facing(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        ["integrated", "front", "user", "built-in", "facetime"]
            .iter()
            .any(|hint| name.contains(hint))
    }
}

/// First user-facing device, else the first device.
fn pick_user_facing(devices: &[DeviceInfo]) -> Option<&DeviceInfo> {
    devices
        .iter()
        .find(|d| d.looks_user_facing())
        .or_else(|| devices.first())
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, Y channel extracted).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
}

/// A V4L2 camera, opened lazily when a stream is requested.
#[derive(Debug, Clone, Default)]
pub struct V4lDevice {
    /// Fixed device path; `None` prefers a user-facing camera.
    path: Option<String>,
}

impl V4lDevice {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Choose among connected devices at open time.
    pub fn auto() -> Self {
        Self { path: None }
    }

    fn resolve_path(&self) -> Result<String, CameraError> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let devices = Self::list_devices();
        let preferred = pick_user_facing(&devices)
            .ok_or_else(|| CameraError::DeviceNotFound("no video capture devices".into()))?;
        tracing::debug!(path = %preferred.path, name = %preferred.name, "selected camera");
        Ok(preferred.path.clone())
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

impl VideoDevice for V4lDevice {
    fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        let path = self.resolve_path()?;
        let camera = Camera::open(&path, constraints.width, constraints.height)?;
        let settings = StreamSettings {
            device: path,
            width: camera.width,
            height: camera.height,
        };
        Ok(Box::new(V4lStream {
            camera: Some(camera),
            settings,
        }))
    }
}

/// Open device handle with its negotiated format.
struct Camera {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl Camera {
    fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;

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
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV or GREY)"
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
            pixel_format,
        })
    }

    fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        Ok(Frame {
            data: self.buf_to_grayscale(buf)?,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }

    fn buf_to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let pixels = (self.width * self.height) as usize;
        match self.pixel_format {
            PixelFormat::Grey if buf.len() < pixels => Err(CameraError::CaptureFailed(format!(
                "GREY buffer too short: expected {pixels}, got {}",
                buf.len()
            ))),
            PixelFormat::Grey => Ok(buf[..pixels].to_vec()),
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
        }
    }
}

fn open_error(device_path: &str, e: io::Error) -> CameraError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        CameraError::PermissionDenied(format!(
            "{device_path}: {e} (is the user in the `video` group?)"
        ))
    } else if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
        CameraError::DeviceBusy
    } else {
        CameraError::DeviceNotFound(format!("{device_path}: {e}"))
    }
}

/// Stream over an open V4L2 device. Stopping closes the device file.
struct V4lStream {
    camera: Option<Camera>,
    settings: StreamSettings,
}

impl VideoStream for V4lStream {
    fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        self.camera
            .as_ref()
            .ok_or(CameraError::Stopped)?
            .capture_frame()
    }

    fn stop(&mut self) {
        if self.camera.take().is_some() {
            tracing::debug!(device = %self.settings.device, "camera released");
        }
    }

    fn is_live(&self) -> bool {
        self.camera.is_some()
    }
}
