//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model on RGB tensors, with 3-stride anchor-free decoding and NMS
//! post-processing.

use crate::tensor::ImageTensor;
use crate::types::BoundingBox;
use ndarray::{Array3, Array4, ArrayView3};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download det_10g.onnx from insightface into the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    input_height: usize,
    input_width: usize,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if num_outputs < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {num_outputs}"
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_height: SCRFD_INPUT_SIZE,
            input_width: SCRFD_INPUT_SIZE,
            stride_indices,
        })
    }

    /// Detect faces scoring above `min_confidence`, sorted by confidence (best first).
    pub fn detect(
        &mut self,
        image: &ImageTensor,
        min_confidence: f32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = self.preprocess(image.view());

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            let dets = decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                self.input_width,
                self.input_height,
                &letterbox,
                min_confidence,
            );
            all_detections.extend(dets);
        }

        let mut result = nms(all_detections, SCRFD_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(result)
    }

    /// Letterbox an RGB tensor into the NCHW float input SCRFD expects.
    fn preprocess(&self, image: ArrayView3<'_, i32>) -> (Array4<f32>, LetterboxInfo) {
        let (height, width, _) = image.dim();

        let scale_w = self.input_width as f32 / width as f32;
        let scale_h = self.input_height as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = ((width as f32 * scale).round() as usize).clamp(1, self.input_width);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, self.input_height);
        let pad_x = (self.input_width - new_w) as f32 / 2.0;
        let pad_y = (self.input_height - new_h) as f32 / 2.0;

        let letterbox = LetterboxInfo { scale, pad_x, pad_y };
        let resized = resize_bilinear(image, new_w, new_h);

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        // Padding uses SCRFD_MEAN so it normalizes to 0.0.
        let mut tensor = Array4::<f32>::zeros((1, 3, self.input_height, self.input_width));

        for y in 0..self.input_height {
            for x in 0..self.input_width {
                let inside = y >= pad_y_start
                    && y < pad_y_start + new_h
                    && x >= pad_x_start
                    && x < pad_x_start + new_w;

                for c in 0..3 {
                    let pixel = if inside {
                        resized[[y - pad_y_start, x - pad_x_start, c]]
                    } else {
                        SCRFD_MEAN
                    };
                    tensor[[0, c, y, x]] = (pixel - SCRFD_MEAN) / SCRFD_STD;
                }
            }
        }

        (tensor, letterbox)
    }
}

/// Bilinear resize of an `(h, w, 3)` tensor to `(new_h, new_w, 3)`.
fn resize_bilinear(image: ArrayView3<'_, i32>, new_w: usize, new_h: usize) -> Array3<f32> {
    let (height, width, channels) = image.dim();
    let inv_scale_x = width as f32 / new_w as f32;
    let inv_scale_y = height as f32 / new_h as f32;

    let mut resized = Array3::<f32>::zeros((new_h, new_w, channels));
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * inv_scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * inv_scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..channels {
                let tl = image[[y0, x0, c]] as f32;
                let tr = image[[y0, x1, c]] as f32;
                let bl = image[[y1, x0, c]] as f32;
                let br = image[[y1, x1, c]] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                resized[[y, x, c]] = val.round().clamp(0.0, 255.0);
            }
        }
    }

    resized
}

/// Discover output tensor ordering by name.
///
/// SCRFD exports either name their outputs ("score_8", "bbox_16", ...) or use
/// generic numeric names. Unrecognized names fall back to the standard
/// positional ordering:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
///   [6-8] = kps    (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    const POSITIONAL: [StrideOutputIndices; 3] = [(0, 3, 6), (1, 4, 7), (2, 5, 8)];

    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let mut mapped = POSITIONAL;
    for (slot, &stride) in mapped.iter_mut().zip(SCRFD_STRIDES.iter()) {
        match (find("score", stride), find("bbox", stride), find("kps", stride)) {
            (Some(score), Some(bbox), Some(kps)) => *slot = (score, bbox, kps),
            _ => {
                tracing::info!(
                    ?names,
                    "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes, [6-8]=kps"
                );
                return POSITIONAL;
            }
        }
    }

    tracing::info!("SCRFD: using name-based output tensor mapping");
    mapped
}

/// Decode detections for a single stride level.
#[allow(clippy::too_many_arguments)]
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    input_width: usize,
    input_height: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid_h = input_height / stride;
    let grid_w = input_width / stride;
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score < threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid_w) as f32 * stride as f32;
        let anchor_cy = (anchor_idx / grid_w) as f32 * stride as f32;

        // bbox: [left, top, right, bottom] distances in stride units
        let bbox_off = idx * 4;
        if bbox_off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[bbox_off] * stride as f32;
        let y1 = anchor_cy - bboxes[bbox_off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[bbox_off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[bbox_off + 3] * stride as f32;

        let orig_x1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let orig_y1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let orig_x2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let orig_y2 = (y2 - letterbox.pad_y) / letterbox.scale;

        let kps_off = idx * 10;
        let landmarks = if kps_off + 9 < kps.len() {
            let mut lms = [(0.0f32, 0.0f32); 5];
            for (i, lm) in lms.iter_mut().enumerate() {
                let lx = anchor_cx + kps[kps_off + i * 2] * stride as f32;
                let ly = anchor_cy + kps[kps_off + i * 2 + 1] * stride as f32;
                *lm = (
                    (lx - letterbox.pad_x) / letterbox.scale,
                    (ly - letterbox.pad_y) / letterbox.scale,
                );
            }
            Some(lms)
        } else {
            None
        };

        detections.push(BoundingBox {
            x: orig_x1,
            y: orig_y1,
            width: orig_x2 - orig_x1,
            height: orig_y2 - orig_y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if !suppressed[j] && iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Compute Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x, y, width: w, height: h, confidence: conf, landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_decode_stride_respects_threshold() {
        let letterbox = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let stride = 32;
        let grid = SCRFD_INPUT_SIZE / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

        let mut scores = vec![0.0f32; anchors];
        scores[0] = 0.85;
        scores[2] = 0.75;
        let bboxes = vec![1.0f32; anchors * 4];
        let kps = vec![0.0f32; anchors * 10];

        let dets = decode_stride(
            &scores, &bboxes, &kps, stride,
            SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE, &letterbox, 0.8,
        );
        assert_eq!(dets.len(), 1);
        assert!((dets[0].confidence - 0.85).abs() < 1e-6);
        // anchor (0,0), offsets of one stride on each side
        assert!((dets[0].x + 32.0).abs() < 1e-4);
        assert!((dets[0].width - 64.0).abs() < 1e-4);
        assert!(dets[0].landmarks.is_some());
    }

    #[test]
    fn test_letterbox_coordinate_roundtrip() {
        let width = 320.0f32;
        let height = 240.0f32;
        let scale = (640.0 / width).min(640.0 / height);
        let pad_x = (640.0 - (width * scale).round()) / 2.0;
        let pad_y = (640.0 - (height * scale).round()) / 2.0;
        let letterbox = LetterboxInfo { scale, pad_x, pad_y };

        let (orig_x, orig_y) = (100.0f32, 50.0f32);
        let recovered_x = (orig_x * scale + pad_x - letterbox.pad_x) / letterbox.scale;
        let recovered_y = (orig_y * scale + pad_y - letterbox.pad_y) / letterbox.scale;

        assert!((recovered_x - orig_x).abs() < 0.1, "x: {recovered_x} vs {orig_x}");
        assert!((recovered_y - orig_y).abs() < 0.1, "y: {recovered_y} vs {orig_y}");
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32",
            "bbox_8",  "bbox_16",  "bbox_32",
            "kps_8",   "kps_16",   "kps_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_bilinear_resize_uniform() {
        let image = Array3::<i32>::from_elem((100, 100, 3), 128);
        let resized = resize_bilinear(image.view(), 200, 150);
        assert_eq!(resized.dim(), (150, 200, 3));
        assert!(resized.iter().all(|&p| p == 128.0), "uniform resize should stay uniform");
    }

    #[test]
    fn test_bilinear_resize_keeps_channels_apart() {
        let mut image = Array3::<i32>::zeros((10, 10, 3));
        image.slice_mut(ndarray::s![.., .., 0]).fill(255);
        let resized = resize_bilinear(image.view(), 5, 5);
        assert!(resized.slice(ndarray::s![.., .., 0]).iter().all(|&p| p == 255.0));
        assert!(resized.slice(ndarray::s![.., .., 1]).iter().all(|&p| p == 0.0));
    }
}
