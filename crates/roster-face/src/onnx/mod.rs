//! ONNX face runtime: SCRFD detection followed by ArcFace description.

mod align;
mod arcface;
mod scrfd;

use crate::runtime::{FaceDetection, FaceRuntime, RuntimeError};
use arcface::ArcFace;
use roster_hw::Frame;
use scrfd::Scrfd;
use std::path::{Path, PathBuf};

pub const DETECTOR_MODEL: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL: &str = "w600k_r50.onnx";

pub struct OnnxRuntime {
    detector: Scrfd,
    recognizer: ArcFace,
}

impl OnnxRuntime {
    /// Load both bundles from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, RuntimeError> {
        let detector = Scrfd::load(&model_file(model_dir, DETECTOR_MODEL)?)?;
        let recognizer = ArcFace::load(&model_file(model_dir, RECOGNIZER_MODEL)?)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

fn model_file(dir: &Path, name: &str) -> Result<PathBuf, RuntimeError> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(RuntimeError::ModelNotFound(path))
    }
}

impl FaceRuntime for OnnxRuntime {
    fn detect_single_face(&mut self, frame: &Frame) -> Result<Option<FaceDetection>, RuntimeError> {
        let faces = self.detector.detect(frame)?;
        let Some(bbox) = faces.into_iter().next() else {
            return Ok(None);
        };
        let descriptor = self.recognizer.describe(frame, &bbox)?;
        tracing::trace!(
            confidence = bbox.confidence,
            x = bbox.x,
            y = bbox.y,
            "face described"
        );
        Ok(Some(FaceDetection { bbox, descriptor }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_models_are_reported_by_path() {
        let dir = std::env::temp_dir().join("roster-no-models-here");
        match OnnxRuntime::load(&dir) {
            Err(RuntimeError::ModelNotFound(path)) => {
                assert!(path.ends_with(DETECTOR_MODEL));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("loaded models from an empty directory"),
        }
    }
}
