//! facereg-core: Known-face registry and face matching.
//!
//! Keeps an in-memory set of known faces derived from a directory of
//! reference images and resolves faces found in video frames against it.
//! Detection and embedding extraction sit behind [`FaceEmbeddingProvider`];
//! [`OnnxProvider`] implements it with SCRFD and ArcFace on ONNX Runtime.

pub mod detector;
pub mod provider;
pub mod recognition;
pub mod recognizer;
pub mod registry;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use provider::{FaceEmbeddingProvider, OnnxProvider, ProviderError};
pub use recognition::{recognize_frame, FRAME_DOWNSCALE};
pub use recognizer::FaceRecognizer;
pub use registry::{
    FaceRegistry, KnownFile, MultiFacePolicy, RegistryError, ALLOWED_EXTENSIONS, DEFAULT_TOLERANCE,
};
pub use types::{
    DetectedFace, Embedding, EuclideanMatcher, FaceRegion, Identity, IdentityMatch, KnownFace,
    MatchResult, Matcher, UNKNOWN_NAME,
};

/// Default location of the ONNX model files: `$XDG_DATA_HOME/facereg/models`,
/// falling back to `~/.local/share/facereg/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facereg")
        .join("models")
}
