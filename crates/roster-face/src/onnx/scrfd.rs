//! SCRFD detector (insightface `det_10g`): three anchor strides with
//! five-point landmarks, decoded and suppressed on the CPU.

use crate::runtime::RuntimeError;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use roster_core::BoundingBox;
use roster_hw::Frame;
use std::path::Path;

const INPUT_SIZE: u32 = 640;
const MEAN: f32 = 127.5;
const STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// Output tensor positions for one stride.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Head {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Placement of the resized frame inside the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub(crate) struct Scrfd {
    session: Session,
    heads: [Head; 3],
}

impl Scrfd {
    pub(crate) fn load(path: &Path) -> Result<Self, RuntimeError> {
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(path)?;

        let names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if names.len() < 9 {
            return Err(RuntimeError::Inference(format!(
                "detector needs 9 outputs (score/bbox/kps per stride), model has {}",
                names.len()
            )));
        }

        let heads = named_layout(&names).unwrap_or_else(|| {
            tracing::debug!(?names, "detector outputs unnamed, assuming positional layout");
            positional_layout()
        });
        tracing::info!(path = %path.display(), ?heads, "loaded SCRFD detector");

        Ok(Self { session, heads })
    }

    /// Faces in `frame`, most confident first.
    pub(crate) fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, RuntimeError> {
        let (input, letterbox) = letterbox(frame)?;
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (head, &stride) in self.heads.iter().zip(STRIDES.iter()) {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| RuntimeError::Inference(format!("{what} at stride {stride}: {e}")))
            };
            let scores = extract(head.score, "scores")?;
            let boxes = extract(head.bbox, "boxes")?;
            let kps = extract(head.kps, "landmarks")?;
            candidates.extend(decode(scores, boxes, kps, stride, &letterbox));
        }

        Ok(suppress(candidates, IOU_THRESHOLD))
    }
}

/// Map `score_8`, `bbox_8`, `kps_8`, ... to stride heads when the export names them.
fn named_layout(names: &[String]) -> Option<[Head; 3]> {
    let find = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let mut heads = [Head::default(); 3];
    for (head, &stride) in heads.iter_mut().zip(STRIDES.iter()) {
        *head = Head {
            score: find("score", stride)?,
            bbox: find("bbox", stride)?,
            kps: find("kps", stride)?,
        };
    }
    Some(heads)
}

/// Stock export order: scores for 8/16/32, then boxes, then landmarks.
fn positional_layout() -> [Head; 3] {
    std::array::from_fn(|i| Head {
        score: i,
        bbox: i + 3,
        kps: i + 6,
    })
}

/// Resize into the 640x640 input keeping aspect ratio; the border is filled
/// with the mean so it normalizes to zero. Gray is replicated into RGB.
fn letterbox(frame: &Frame) -> Result<(Array4<f32>, Letterbox), RuntimeError> {
    let gray = ImageBuffer::<Luma<u8>, &[u8]>::from_raw(frame.width, frame.height, &frame.data[..])
        .ok_or_else(|| {
            RuntimeError::Inference(format!(
                "frame buffer of {} bytes does not hold {}x{}",
                frame.data.len(),
                frame.width,
                frame.height
            ))
        })?;

    let side = INPUT_SIZE as f32;
    let scale = (side / frame.width as f32).min(side / frame.height as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let off_x = (INPUT_SIZE - new_w) / 2;
    let off_y = (INPUT_SIZE - new_h) / 2;

    let resized = imageops::resize(&gray, new_w, new_h, FilterType::Triangle);

    let n = INPUT_SIZE as usize;
    let tensor = Array4::from_shape_fn((1, 3, n, n), |(_, _, y, x)| {
        let (x, y) = (x as u32, y as u32);
        let inside = (off_x..off_x + new_w).contains(&x) && (off_y..off_y + new_h).contains(&y);
        let pixel = if inside {
            resized.get_pixel(x - off_x, y - off_y).0[0] as f32
        } else {
            MEAN
        };
        (pixel - MEAN) / STD
    });

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x: off_x as f32,
            pad_y: off_y as f32,
        },
    ))
}

/// Turn one stride's raw distances into frame-space boxes above the score threshold.
fn decode(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<BoundingBox> {
    let cells_per_row = INPUT_SIZE as usize / stride;
    let anchors = cells_per_row * cells_per_row * ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..anchors.min(scores.len()))
        .filter(|&i| scores[i] > SCORE_THRESHOLD)
        .filter_map(|i| {
            let cell = i / ANCHORS_PER_CELL;
            let ax = (cell % cells_per_row) as f32 * s;
            let ay = (cell / cells_per_row) as f32 * s;

            let d = boxes.get(i * 4..i * 4 + 4)?;
            let (x1, y1) = letterbox.unmap(ax - d[0] * s, ay - d[1] * s);
            let (x2, y2) = letterbox.unmap(ax + d[2] * s, ay + d[3] * s);

            let landmarks = kps.get(i * 10..i * 10 + 10).map(|p| {
                std::array::from_fn(|k| letterbox.unmap(ax + p[k * 2] * s, ay + p[k * 2 + 1] * s))
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: scores[i],
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence.
fn suppress(mut boxes: Vec<BoundingBox>, iou_max: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_max) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = w * h;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, side: f32, confidence: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: side,
            height: side,
            confidence,
            landmarks: None,
        }
    }

    fn frame(width: u32, height: u32, fill: u8) -> Frame {
        Frame {
            data: vec![fill; (width * height) as usize],
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_iou() {
        let a = bbox(0.0, 0.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &bbox(20.0, 20.0, 10.0, 1.0)), 0.0);
        // 5x10 overlap over a 150 union
        let b = BoundingBox { x: 5.0, ..a.clone() };
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_suppress_keeps_best_of_overlapping() {
        let kept = suppress(
            vec![
                bbox(5.0, 5.0, 100.0, 0.8),
                bbox(200.0, 200.0, 50.0, 0.7),
                bbox(0.0, 0.0, 100.0, 0.9),
            ],
            IOU_THRESHOLD,
        );
        let confidences: Vec<f32> = kept.iter().map(|b| b.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn test_layout_by_name_in_any_order() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let heads = named_layout(&names).unwrap();
        assert_eq!(heads[0], Head { score: 2, bbox: 0, kps: 1 });
        assert_eq!(heads[2], Head { score: 8, bbox: 6, kps: 7 });
    }

    #[test]
    fn test_layout_falls_back_to_positions() {
        let names: Vec<String> = (400..409).map(|i| i.to_string()).collect();
        assert!(named_layout(&names).is_none());
        assert_eq!(positional_layout()[1], Head { score: 1, bbox: 4, kps: 7 });
    }

    #[test]
    fn test_letterbox_pads_vertically_for_landscape_frames() {
        let (tensor, lb) = letterbox(&frame(640, 480, 200)).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);
        // border normalizes to zero, content does not
        assert_eq!(tensor[[0, 0, 10, 320]], 0.0);
        assert!(tensor[[0, 2, 320, 320]] > 0.5);
    }

    #[test]
    fn test_letterbox_rejects_short_buffer() {
        let mut f = frame(4, 4, 0);
        f.data.truncate(3);
        assert!(letterbox(&f).is_err());
    }

    #[test]
    fn test_decode_maps_back_to_frame_space() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0.0,
            pad_y: 80.0,
        };
        let stride = 32;
        let anchors = (640 / stride) * (640 / stride) * ANCHORS_PER_CELL;
        let mut scores = vec![0.0; anchors];
        let mut boxes = vec![0.0; anchors * 4];
        let kps = vec![0.0; anchors * 10];
        // anchor 0 sits at cell (0, 0); pick the cell one to the right and five down
        let idx = (5 * 20 + 1) * ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        boxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let dets = decode(&scores, &boxes, &kps, stride, &lb);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        // anchor at (32, 160) in input space, box +-32 px, then unletterboxed
        assert!((d.x - 0.0).abs() < 1e-4);
        assert!((d.y - 24.0).abs() < 1e-4);
        assert!((d.width - 32.0).abs() < 1e-4);
        let lm = d.landmarks.unwrap();
        assert!((lm[0].0 - 16.0).abs() < 1e-4);
        assert!((lm[0].1 - 40.0).abs() < 1e-4);
    }
}
