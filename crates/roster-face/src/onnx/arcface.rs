//! ArcFace recognizer (insightface `w600k_r50`).

use super::align::{self, ALIGNED_SIZE};
use crate::runtime::RuntimeError;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use roster_core::{BoundingBox, FaceDescriptor};
use roster_hw::Frame;
use std::path::Path;

// Symmetric normalization, unlike the detector's 128.0 divisor.
const MEAN: f32 = 127.5;
const STD: f32 = 127.5;
pub(crate) const DESCRIPTOR_LEN: usize = 512;

pub(crate) struct ArcFace {
    session: Session,
}

impl ArcFace {
    pub(crate) fn load(path: &Path) -> Result<Self, RuntimeError> {
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(path)?;
        tracing::info!(
            path = %path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace recognizer"
        );
        Ok(Self { session })
    }

    /// Align the face and produce its L2-normalized descriptor.
    pub(crate) fn describe(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<FaceDescriptor, RuntimeError> {
        let landmarks = face.landmarks.as_ref().ok_or(RuntimeError::NoLandmarks)?;
        let crop = align::align_face(&frame.data, frame.width, frame.height, landmarks);
        let input = to_tensor(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RuntimeError::Inference(format!("descriptor output: {e}")))?;

        if raw.len() != DESCRIPTOR_LEN {
            return Err(RuntimeError::Inference(format!(
                "expected a {DESCRIPTOR_LEN}-value descriptor, got {}",
                raw.len()
            )));
        }

        let descriptor = FaceDescriptor::normalized(raw.to_vec());
        if !descriptor.is_finite() {
            return Err(RuntimeError::Inference("descriptor contains NaN".into()));
        }
        Ok(descriptor)
    }
}

fn to_tensor(crop: &[u8]) -> Array4<f32> {
    Array4::from_shape_fn((1, 3, ALIGNED_SIZE, ALIGNED_SIZE), |(_, _, y, x)| {
        let pixel = crop.get(y * ALIGNED_SIZE + x).copied().unwrap_or(0) as f32;
        (pixel - MEAN) / STD
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_layout_and_normalization() {
        let crop = vec![255u8; ALIGNED_SIZE * ALIGNED_SIZE];
        let t = to_tensor(&crop);
        assert_eq!(t.shape(), &[1, 3, ALIGNED_SIZE, ALIGNED_SIZE]);
        assert!((t[[0, 1, 50, 50]] - 1.0).abs() < 1e-6);
        assert_eq!(t[[0, 0, 7, 9]], t[[0, 2, 7, 9]]);
    }

    #[test]
    fn test_short_crop_reads_as_black() {
        let t = to_tensor(&[]);
        assert!((t[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
    }
}
