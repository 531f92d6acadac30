//! ArcFace face embedder via ONNX Runtime.
//!
//! Extracts 512-dimensional face embeddings from aligned face crops,
//! using the w600k_r50 ArcFace model.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::pipeline::FaceEmbedder;
use crate::types::{Embedding, FaceRegion};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download w600k_r50.onnx from insightface")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("face landmarks are degenerate; cannot align")]
    DegenerateLandmarks,
    #[error("aligned crop is {0}x{1}, expected {ALIGNED_SIZE}x{ALIGNED_SIZE}")]
    BadCropSize(u32, u32),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face embedder.
pub struct OnnxEmbedder {
    session: Session,
}

impl OnnxEmbedder {
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
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Convert a 112×112 RGB crop into a normalized NCHW float tensor.
    fn preprocess(aligned: &RgbImage) -> Array4<f32> {
        let size = ALIGNED_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in aligned.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }
        tensor
    }
}

impl FaceEmbedder for OnnxEmbedder {
    fn align(&self, image: &RgbImage, face: &FaceRegion) -> Result<RgbImage, RecognizerError> {
        aligned_crop(image, face)
    }

    fn embed(&mut self, aligned: &RgbImage) -> Result<Embedding, RecognizerError> {
        let (w, h) = aligned.dimensions();
        if (w, h) != (ALIGNED_SIZE, ALIGNED_SIZE) {
            return Err(RecognizerError::BadCropSize(w, h));
        }

        let input = Self::preprocess(aligned);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw_data.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw_data.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw_data),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// Warp the face to the 112×112 ArcFace template using its landmarks.
fn aligned_crop(image: &RgbImage, face: &FaceRegion) -> Result<RgbImage, RecognizerError> {
    let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
    alignment::align_face(image, landmarks).ok_or(RecognizerError::DegenerateLandmarks)
}

/// Scale to unit length; a zero vector is returned unchanged.
fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;

    #[test]
    fn test_preprocess_layout_and_normalization() {
        let mut crop = RgbImage::from_pixel(ALIGNED_SIZE, ALIGNED_SIZE, Rgb([0, 128, 255]));
        crop.put_pixel(3, 7, Rgb([255, 255, 255]));
        let tensor = OnnxEmbedder::preprocess(&crop);

        let size = ALIGNED_SIZE as usize;
        assert_eq!(tensor.shape(), &[1, 3, size, size]);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], -1.0);
        assert_relative_eq!(tensor[[0, 1, 0, 0]], (128.0 - ARCFACE_MEAN) / ARCFACE_STD);
        assert_relative_eq!(tensor[[0, 2, 0, 0]], 1.0);
        // (x=3, y=7) lands at row 7, column 3
        assert_relative_eq!(tensor[[0, 0, 7, 3]], 1.0);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert_relative_eq!(v[0], 0.6);
        assert_relative_eq!(v[1], 0.8);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    fn face(landmarks: Option<[(f32, f32); 5]>) -> FaceRegion {
        FaceRegion {
            x: 20.0,
            y: 20.0,
            width: 100.0,
            height: 100.0,
            confidence: 0.9,
            landmarks,
        }
    }

    #[test]
    fn test_alignment_requires_landmarks() {
        let frame = RgbImage::new(200, 200);
        let err = aligned_crop(&frame, &face(None)).unwrap_err();
        assert!(matches!(err, RecognizerError::NoLandmarks));
    }

    #[test]
    fn test_alignment_rejects_degenerate_landmarks() {
        let frame = RgbImage::new(200, 200);
        let err = aligned_crop(&frame, &face(Some([(0.0, 0.0); 5]))).unwrap_err();
        assert!(matches!(err, RecognizerError::DegenerateLandmarks));
    }

    #[test]
    fn test_alignment_produces_model_input_size() {
        let frame = RgbImage::from_pixel(200, 200, Rgb([90, 90, 90]));
        let landmarks = [
            (60.0, 70.0),
            (100.0, 70.0),
            (80.0, 95.0),
            (64.0, 115.0),
            (96.0, 115.0),
        ];
        let crop = aligned_crop(&frame, &face(Some(landmarks))).unwrap();
        assert_eq!(crop.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }
}
