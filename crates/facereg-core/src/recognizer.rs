//! ArcFace face recognizer via ONNX Runtime.
//!
//! Extracts 512-dimensional, L2-normalized embeddings from square face crops
//! using the w600k_r50 ArcFace model.

use crate::types::{Embedding, FaceRegion};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: u32 = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric; not 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";
/// Extra context around the detected box, as a fraction of its longer side.
const CROP_MARGIN: f32 = 0.2;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region {0:?} is empty or outside the image")]
    EmptyRegion(FaceRegion),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Extract the embedding of the face inside `region`.
    pub fn extract(&mut self, image: &RgbImage, region: &FaceRegion) -> Result<Embedding, RecognizerError> {
        let crop = square_crop(image, region).ok_or(RecognizerError::EmptyRegion(*region))?;
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// Cut a square around `region` (padded by `CROP_MARGIN`, clipped to the
/// image) and resize it to the ArcFace input size.
fn square_crop(image: &RgbImage, region: &FaceRegion) -> Option<RgbImage> {
    if region.width() == 0 || region.height() == 0 {
        return None;
    }

    let side = region.width().max(region.height()) as f32 * (1.0 + CROP_MARGIN);
    let cx = (region.left + region.right) as f32 / 2.0;
    let cy = (region.top + region.bottom) as f32 / 2.0;

    let x0 = (cx - side / 2.0).max(0.0) as u32;
    let y0 = (cy - side / 2.0).max(0.0) as u32;
    let x1 = ((cx + side / 2.0) as u32).min(image.width());
    let y1 = ((cy + side / 2.0) as u32).min(image.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let cropped = image::imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    Some(image::imageops::resize(
        &cropped,
        ARCFACE_INPUT_SIZE,
        ARCFACE_INPUT_SIZE,
        FilterType::Triangle,
    ))
}

/// Normalize a 112×112 RGB crop into a NCHW float tensor.
fn preprocess(face: &RgbImage) -> Array4<f32> {
    let size = ARCFACE_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in face.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
