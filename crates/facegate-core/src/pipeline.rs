//! Face extraction pipeline: detector → aligner → embedder.
//!
//! Used identically by gallery loading, live recognition and enrollment.

use crate::detector::DetectorError;
use crate::recognizer::RecognizerError;
use crate::types::{Embedding, FaceRegion};
use image::RgbImage;
use thiserror::Error;

/// Locates faces in a frame.
///
/// `width` and `height` are always the frame's exact pixel size; backends
/// that need an input size configured per call take it from here.
pub trait FaceDetector {
    fn detect(
        &mut self,
        image: &RgbImage,
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, DetectorError>;
}

/// Turns a detected face into an identity embedding.
///
/// `embed` must only be given the output of `align`.
pub trait FaceEmbedder {
    fn align(&self, image: &RgbImage, face: &FaceRegion) -> Result<RgbImage, RecognizerError>;
    fn embed(&mut self, aligned: &RgbImage) -> Result<Embedding, RecognizerError>;
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("embedder returned an unusable embedding for face {index}")]
    InvalidEmbedding { index: usize },
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// One face found in a frame.
#[derive(Debug, Clone)]
pub struct ExtractedFace {
    pub region: FaceRegion,
    pub embedding: Embedding,
}

/// Owns the detection and embedding backends.
pub struct FaceExtractor<D, E> {
    detector: D,
    embedder: E,
}

impl<D: FaceDetector, E: FaceEmbedder> FaceExtractor<D, E> {
    pub fn new(detector: D, embedder: E) -> Self {
        Self { detector, embedder }
    }

    /// Detect every face in `image` and embed each one, in detector order.
    ///
    /// No faces is an empty result, not an error.
    pub fn extract(&mut self, image: &RgbImage) -> Result<Vec<ExtractedFace>, ExtractionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ExtractionError::EmptyImage { width, height });
        }

        let regions = self.detector.detect(image, width, height)?;
        tracing::debug!(faces = regions.len(), width, height, "detection complete");

        let mut faces = Vec::with_capacity(regions.len());
        for (index, region) in regions.into_iter().enumerate() {
            let aligned = self.embedder.align(image, &region)?;
            let embedding = self.embedder.embed(&aligned)?;
            if !embedding.is_valid() {
                return Err(ExtractionError::InvalidEmbedding { index });
            }
            faces.push(ExtractedFace { region, embedding });
        }

        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{face_frame, fake_extractor, FakeDetector, FakeEmbedder};

    #[test]
    fn test_no_faces_is_empty() {
        let mut extractor = fake_extractor();
        let faces = extractor.extract(&face_frame(&[])).unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    fn test_one_embedding_per_region_in_order() {
        let mut extractor = fake_extractor();
        let frame = face_frame(&[[200, 10, 10], [10, 200, 10], [10, 10, 200]]);
        let faces = extractor.extract(&frame).unwrap();

        assert_eq!(faces.len(), 3);
        assert!(faces.windows(2).all(|w| w[0].region.x < w[1].region.x));
        assert_eq!(faces[0].embedding.values, vec![200.0, 10.0, 10.0]);
        assert_eq!(faces[2].embedding.values, vec![10.0, 10.0, 200.0]);
    }

    #[test]
    fn test_detector_sees_frame_size() {
        let mut extractor = fake_extractor();
        let frame = face_frame(&[[1, 2, 3]]);
        extractor.extract(&frame).unwrap();
        assert_eq!(extractor.detector.last_input_size, Some(frame.dimensions()));
    }

    #[test]
    fn test_empty_image_fails_fast() {
        let mut extractor = fake_extractor();
        let err = extractor.extract(&RgbImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyImage { width: 0, height: 0 }));
        assert_eq!(extractor.detector.last_input_size, None);
    }

    #[test]
    fn test_invalid_embedding_is_rejected() {
        let mut extractor = FaceExtractor::new(
            FakeDetector::default(),
            FakeEmbedder { poison: true },
        );
        let err = extractor.extract(&face_frame(&[[5, 5, 5]])).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidEmbedding { index: 0 }));
    }
}
