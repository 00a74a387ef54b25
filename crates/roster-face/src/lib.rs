//! roster-face: Camera-backed face enrollment and face login.
//!
//! A [`ModelLoader`] owns the face runtime (SCRFD + ArcFace over ONNX by
//! default). A [`CameraController`] owns the video stream and the session
//! generation; the detection loop and the enrollment/verification sessions
//! are built on top of both.

pub mod controller;
pub mod detection;
pub mod loader;
pub mod onnx;
pub mod runtime;
pub mod session;

pub use controller::{CameraController, SETTLE_DELAY};
pub use loader::{ModelLoader, SharedRuntime};
pub use onnx::OnnxRuntime;
pub use runtime::{FaceDetection, FaceRuntime, RuntimeError};
pub use session::{
    CaptureOutcome, EnrollmentSession, SessionError, VerificationSession, VerifyAttempt,
    AUTO_CLOSE_DELAY,
};

use std::path::PathBuf;

/// Default model directory: `$XDG_DATA_HOME/roster/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("roster/models")
}
