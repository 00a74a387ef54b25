//! The face runtime seam: one call that finds a single face and describes it.

use roster_core::{BoundingBox, FaceDescriptor};
use roster_hw::Frame;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("model file not found: {0} (set ROSTER_MODEL_DIR or download the insightface buffalo_l pack)")]
    ModelNotFound(PathBuf),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("detected face has no landmarks to align")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// The most prominent face in a frame and its descriptor.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub descriptor: FaceDescriptor,
}

/// Single-face detection with descriptor extraction.
///
/// Implementations are not reentrant; callers share one behind a mutex so at
/// most one sample is in flight.
pub trait FaceRuntime: Send + 'static {
    /// `Ok(None)` means no face in this frame, which is not an error.
    fn detect_single_face(&mut self, frame: &Frame) -> Result<Option<FaceDetection>, RuntimeError>;
}
