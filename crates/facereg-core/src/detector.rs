//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB image into the 640×640 network input, decodes the
//! three anchor-free stride heads and applies NMS.

use crate::types::FaceRegion;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A raw detection in source-image pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl Detection {
    /// Round to an integer region clamped to a `width`×`height` image.
    pub fn region(&self, width: u32, height: u32) -> FaceRegion {
        let clamp = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as u32;
        FaceRegion {
            top: clamp(self.y1, height),
            right: clamp(self.x2, width),
            bottom: clamp(self.y2, height),
            left: clamp(self.x1, width),
        }
    }

    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// Mapping between the letterboxed network input and the source image.
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Per-stride output indices for strides [8, 16, 32].
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

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self { session, stride_indices })
    }

    /// Detect faces in an RGB image, strongest detection first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[slot];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            all.extend(decode_stride(scores, bboxes, stride, &letterbox, SCRFD_CONFIDENCE_THRESHOLD));
        }

        Ok(nms(all, SCRFD_NMS_THRESHOLD))
    }
}

/// Resize into the network input, keeping aspect ratio, and normalize to NCHW.
///
/// Padding stays at 0.0, which is what `SCRFD_MEAN` normalizes to.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let size = SCRFD_INPUT_SIZE;
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);

    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let ty = (y + pad_y) as usize;
        let tx = (x + pad_x) as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Discover output tensor ordering by name.
///
/// Exports either name their heads `score_8`, `bbox_16`, ... or use generic
/// numeric names. Generic names fall back to the standard positional layout:
/// `[0-2]` scores, `[3-5]` bboxes, `[6-8]` keypoints.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let mut indices = [(0, 0); 3];
    for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride)) {
            (Some(score), Some(bbox)) => indices[slot] = (score, bbox),
            _ => {
                tracing::info!(?names, "SCRFD: output names not recognized, using positional mapping");
                return [(0, 3), (1, 4), (2, 5)];
            }
        }
    }
    tracing::info!("SCRFD: using name-based output tensor mapping");
    indices
}

/// Decode detections for a single stride level into source-image coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<Detection> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let unmap_x = |v: f32| (v - letterbox.pad_x as f32) / letterbox.scale;
    let unmap_y = |v: f32| (v - letterbox.pad_y as f32) / letterbox.scale;

    let mut detections = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }
        let Some(offsets) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * step;
        let anchor_y = (cell / grid) as f32 * step;

        detections.push(Detection {
            x1: unmap_x(anchor_x - offsets[0] * step),
            y1: unmap_y(anchor_y - offsets[1] * step),
            x2: unmap_x(anchor_x + offsets[2] * step),
            y2: unmap_y(anchor_y + offsets[3] * step),
            confidence: score,
        });
    }

    detections
}

/// Non-Maximum Suppression. Output is sorted by descending confidence.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep.iter().all(|kept| iou(kept, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-Union between two detections.
fn iou(a: &Detection, b: &Detection) -> f32 {
    let inter = Detection {
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
        x2: a.x2.min(b.x2),
        y2: a.y2.min(b.y2),
        confidence: 0.0,
    }
    .area();
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
