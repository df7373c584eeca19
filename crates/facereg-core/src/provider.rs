//! Face embedding providers.
//!
//! The registry and frame recognition only see [`FaceEmbeddingProvider`].
//! [`OnnxProvider`] is the production implementation: SCRFD for detection,
//! ArcFace for embeddings.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{DetectedFace, Embedding};
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model filename inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model filename inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detects faces and computes one fixed-length embedding per face.
///
/// Implementations may be slow; callers run them synchronously.
pub trait FaceEmbeddingProvider: Send {
    /// Every face found in `image`, with region coordinates in `image`'s own resolution.
    fn detect_and_encode(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ProviderError>;

    /// Embeddings of every face in a full-resolution reference photo.
    fn encode_single(&mut self, image: &DynamicImage) -> Result<Vec<Embedding>, ProviderError> {
        Ok(self
            .detect_and_encode(image)?
            .into_iter()
            .map(|face| face.embedding)
            .collect())
    }
}

/// SCRFD + ArcFace provider running on ONNX Runtime.
pub struct OnnxProvider {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxProvider {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, ProviderError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceEmbeddingProvider for OnnxProvider {
    fn detect_and_encode(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ProviderError> {
        let rgb = image.to_rgb8();
        let detections = self.detector.detect(&rgb)?;
        tracing::debug!(
            faces = detections.len(),
            width = rgb.width(),
            height = rgb.height(),
            "detection pass"
        );

        detections
            .iter()
            .map(|det| {
                let region = det.region(rgb.width(), rgb.height());
                let embedding = self.recognizer.extract(&rgb, &region)?;
                Ok(DetectedFace { region, embedding })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaceRegion;

    struct TwoFaces;

    impl FaceEmbeddingProvider for TwoFaces {
        fn detect_and_encode(&mut self, _image: &DynamicImage) -> Result<Vec<DetectedFace>, ProviderError> {
            let region = FaceRegion { top: 0, right: 1, bottom: 1, left: 0 };
            Ok(vec![
                DetectedFace { region, embedding: Embedding::new(vec![1.0]) },
                DetectedFace { region, embedding: Embedding::new(vec![2.0]) },
            ])
        }
    }

    #[test]
    fn test_encode_single_defaults_to_all_embeddings() {
        let image = DynamicImage::new_rgb8(4, 4);
        let embeddings = TwoFaces.encode_single(&image).unwrap();
        assert_eq!(embeddings, vec![Embedding::new(vec![1.0]), Embedding::new(vec![2.0])]);
    }

    #[test]
    fn test_onnx_provider_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxProvider::load(dir.path()).err().unwrap();
        assert!(matches!(err, ProviderError::Detector(DetectorError::ModelNotFound(_))));
    }
}
