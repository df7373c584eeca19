//! Live-frame recognition: detect on a downscaled copy, match against the registry.

use crate::provider::{FaceEmbeddingProvider, ProviderError};
use crate::registry::FaceRegistry;
use crate::types::MatchResult;
use image::imageops::FilterType;
use image::DynamicImage;

/// Frames are shrunk by this factor in each dimension before detection;
/// detected regions are multiplied back by it.
pub const FRAME_DOWNSCALE: u32 = 4;

/// Recognize every face in a video frame.
///
/// One result per detected face, in detection order, with regions in the
/// frame's original resolution.
pub fn recognize_frame(
    provider: &mut dyn FaceEmbeddingProvider,
    registry: &FaceRegistry,
    frame: &DynamicImage,
) -> Result<Vec<MatchResult>, ProviderError> {
    let small = downscale(frame);
    let faces = provider.detect_and_encode(&small)?;

    let results: Vec<MatchResult> = faces
        .into_iter()
        .map(|face| {
            let matched = registry.match_embedding(&face.embedding);
            MatchResult {
                identity: matched.identity,
                confidence: matched.confidence,
                region: face.region.scaled(FRAME_DOWNSCALE),
            }
        })
        .collect();

    tracing::debug!(
        width = frame.width(),
        height = frame.height(),
        faces = results.len(),
        known = results.iter().filter(|r| r.identity.is_known()).count(),
        "frame recognized"
    );
    Ok(results)
}

fn downscale(frame: &DynamicImage) -> DynamicImage {
    let width = (frame.width() / FRAME_DOWNSCALE).max(1);
    let height = (frame.height() / FRAME_DOWNSCALE).max(1);
    frame.resize_exact(width, height, FilterType::Triangle)
}
