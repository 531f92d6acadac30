//! Deterministic stand-ins for the inference backends.
//!
//! A test frame encodes its own ground truth: the red channel of pixel (0, 0)
//! is the number of faces, and face `i` is a solid 16×16 square at
//! `(16 + 24 * i, 16)`. The fake embedder returns the mean RGB of the crop, so
//! a face's embedding is exactly its square's color.

use crate::detector::DetectorError;
use crate::pipeline::{FaceDetector, FaceEmbedder, FaceExtractor};
use crate::recognizer::RecognizerError;
use crate::types::{Embedding, FaceRegion};
use image::{Rgb, RgbImage};

const FACE_SIZE: u32 = 16;
const FACE_STRIDE: u32 = 24;
const FACE_ORIGIN: u32 = 16;

pub type FakeExtractor = FaceExtractor<FakeDetector, FakeEmbedder>;

pub fn fake_extractor() -> FakeExtractor {
    FaceExtractor::new(FakeDetector::default(), FakeEmbedder::default())
}

/// Build a 128×48 frame containing one solid square per color.
pub fn face_frame(colors: &[[u8; 3]]) -> RgbImage {
    assert!(colors.len() <= 4, "test frame holds at most four faces");
    let mut frame = RgbImage::new(128, 48);
    frame.put_pixel(0, 0, Rgb([colors.len() as u8, 0, 0]));
    for (i, color) in colors.iter().enumerate() {
        let x0 = FACE_ORIGIN + FACE_STRIDE * i as u32;
        for y in FACE_ORIGIN..FACE_ORIGIN + FACE_SIZE {
            for x in x0..x0 + FACE_SIZE {
                frame.put_pixel(x, y, Rgb(*color));
            }
        }
    }
    frame
}

#[derive(Default)]
pub struct FakeDetector {
    pub last_input_size: Option<(u32, u32)>,
}

impl FaceDetector for FakeDetector {
    fn detect(
        &mut self,
        image: &RgbImage,
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, DetectorError> {
        assert_eq!((width, height), image.dimensions(), "input size must match frame");
        self.last_input_size = Some((width, height));

        let count = image.get_pixel(0, 0)[0] as u32;
        Ok((0..count)
            .map(|i| FaceRegion {
                x: (FACE_ORIGIN + FACE_STRIDE * i) as f32,
                y: FACE_ORIGIN as f32,
                width: FACE_SIZE as f32,
                height: FACE_SIZE as f32,
                confidence: 0.99,
                landmarks: None,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeEmbedder {
    /// Emit NaN embeddings.
    pub poison: bool,
}

impl FaceEmbedder for FakeEmbedder {
    fn align(&self, image: &RgbImage, face: &FaceRegion) -> Result<RgbImage, RecognizerError> {
        Ok(image::imageops::crop_imm(
            image,
            face.x as u32,
            face.y as u32,
            face.width as u32,
            face.height as u32,
        )
        .to_image())
    }

    fn embed(&mut self, aligned: &RgbImage) -> Result<Embedding, RecognizerError> {
        if self.poison {
            return Ok(Embedding::new(vec![f32::NAN; 3]));
        }
        let n = (aligned.width() * aligned.height()).max(1) as f32;
        let mut sums = [0.0f32; 3];
        for pixel in aligned.pixels() {
            for (sum, &c) in sums.iter_mut().zip(pixel.0.iter()) {
                *sum += c as f32;
            }
        }
        Ok(Embedding::new(sums.iter().map(|s| s / n).collect()))
    }
}
