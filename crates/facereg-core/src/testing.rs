//! Deterministic provider for tests.
//!
//! Every 8-pixel-wide column strip of an image counts as one face; its
//! embedding is the strip's top-left colour scaled to [0, 1] plus the strip
//! index. Images narrower than 8 pixels have no faces.

use crate::provider::{FaceEmbeddingProvider, ProviderError};
use crate::types::{DetectedFace, Embedding, FaceRegion};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

pub const FACE_WIDTH: u32 = 8;

pub struct FakeProvider;

impl FakeProvider {
    pub fn embedding_for(color: [u8; 3], index: u32) -> Embedding {
        Embedding::new(vec![
            color[0] as f32 / 255.0,
            color[1] as f32 / 255.0,
            color[2] as f32 / 255.0,
            index as f32,
        ])
    }
}

impl FaceEmbeddingProvider for FakeProvider {
    fn detect_and_encode(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ProviderError> {
        let (width, height) = image.dimensions();
        Ok((0..width / FACE_WIDTH)
            .map(|i| {
                let px = image.get_pixel(i * FACE_WIDTH, 0);
                DetectedFace {
                    region: FaceRegion {
                        top: 0,
                        right: (i + 1) * FACE_WIDTH,
                        bottom: height,
                        left: i * FACE_WIDTH,
                    },
                    embedding: Self::embedding_for([px[0], px[1], px[2]], i),
                }
            })
            .collect())
    }
}

/// PNG bytes of a uniformly coloured image holding `faces` fake faces.
pub fn face_png(color: [u8; 3], faces: u32) -> Vec<u8> {
    let width = if faces == 0 { FACE_WIDTH / 2 } else { faces * FACE_WIDTH };
    let image = RgbImage::from_pixel(width, FACE_WIDTH, Rgb(color));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

pub fn write_face(dir: &Path, filename: &str, color: [u8; 3], faces: u32) {
    std::fs::write(dir.join(filename), face_png(color, faces)).expect("write face");
}
