//! Per-frame recognition: extract, match every face, annotate.

use crate::annotate::Annotator;
use crate::gallery::Gallery;
use crate::pipeline::{ExtractionError, FaceDetector, FaceEmbedder, FaceExtractor};
use crate::types::{CosineMatcher, FaceRegion, COSINE_THRESHOLD};
use image::RgbImage;
use serde::Serialize;

/// Recognition outcome for one face in a frame.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizedFace {
    pub region: FaceRegion,
    /// Enrolled label, or `unknown_<index>` for a rejected face.
    pub label: String,
    pub accepted: bool,
    pub score: f32,
}

/// A frame's annotated copy plus the per-face results behind it.
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub faces: Vec<RecognizedFace>,
}

impl AnnotatedFrame {
    pub fn accepted(&self) -> impl Iterator<Item = &RecognizedFace> {
        self.faces.iter().filter(|f| f.accepted)
    }
}

/// Stateless across frames; only reads the gallery it is handed.
#[derive(Default)]
pub struct RecognitionSession {
    matcher: CosineMatcher,
    annotator: Annotator,
}

impl RecognitionSession {
    pub fn new(annotator: Annotator) -> Self {
        Self {
            matcher: CosineMatcher,
            annotator,
        }
    }

    /// Identify every face in `image` against `gallery`.
    ///
    /// Returns an annotated copy; `image` itself is never modified.
    pub fn annotate<D, E>(
        &self,
        extractor: &mut FaceExtractor<D, E>,
        image: &RgbImage,
        gallery: &Gallery,
    ) -> Result<AnnotatedFrame, ExtractionError>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        let extracted = extractor.extract(image)?;
        let mut canvas = image.clone();
        let mut faces = Vec::with_capacity(extracted.len());

        for (idx, face) in extracted.into_iter().enumerate() {
            let result = gallery.identify(&self.matcher, &face.embedding, COSINE_THRESHOLD);
            let label = if result.accepted {
                result.label
            } else {
                format!("unknown_{idx}")
            };

            self.annotator
                .draw_face(&mut canvas, &face.region, &label, result.score, result.accepted);

            faces.push(RecognizedFace {
                region: face.region,
                label,
                accepted: result.accepted,
                score: result.score,
            });
        }

        tracing::debug!(
            faces = faces.len(),
            accepted = faces.iter().filter(|f| f.accepted).count(),
            gallery = gallery.len(),
            "frame annotated"
        );

        Ok(AnnotatedFrame { image: canvas, faces })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{face_frame, fake_extractor};
    use crate::types::{Embedding, EnrollmentRecord};
    use std::path::PathBuf;

    fn gallery(entries: &[(&str, [f32; 3])]) -> Gallery {
        Gallery::from_records(entries.iter().map(|(label, v)| EnrollmentRecord {
            label: label.to_string(),
            embedding: Embedding::new(v.to_vec()),
            source: PathBuf::new(),
        }))
    }

    #[test]
    fn test_zero_faces_returns_unchanged_copy() {
        let session = RecognitionSession::default();
        let frame = face_frame(&[]);
        let out = session
            .annotate(&mut fake_extractor(), &frame, &gallery(&[("bob", [1.0, 0.0, 0.0])]))
            .unwrap();

        assert!(out.faces.is_empty());
        assert_eq!(out.image, frame);
    }

    #[test]
    fn test_labels_known_and_unknown_faces() {
        let session = RecognitionSession::default();
        let gallery = gallery(&[("red", [250.0, 0.0, 0.0]), ("blue", [0.0, 0.0, 250.0])]);
        // unknown, red, unknown
        let frame = face_frame(&[[0, 200, 0], [240, 10, 10], [0, 180, 10]]);

        let out = session.annotate(&mut fake_extractor(), &frame, &gallery).unwrap();
        let labels: Vec<_> = out.faces.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["unknown_0", "red", "unknown_2"]);

        assert!(out.faces[1].accepted);
        assert!(out.faces[1].score > 0.99);
        assert!(!out.faces[0].accepted);
        assert_eq!(out.faces[0].score, 0.0);
        assert_eq!(out.accepted().count(), 1);
    }

    #[test]
    fn test_input_frame_is_not_mutated() {
        let session = RecognitionSession::default();
        let frame = face_frame(&[[240, 10, 10]]);
        let before = frame.clone();

        let out = session
            .annotate(&mut fake_extractor(), &frame, &gallery(&[("red", [250.0, 0.0, 0.0])]))
            .unwrap();

        assert_eq!(frame, before);
        assert_ne!(out.image, frame);
    }

    #[test]
    fn test_empty_gallery_rejects_everyone() {
        let session = RecognitionSession::default();
        let frame = face_frame(&[[240, 10, 10], [10, 240, 10]]);
        let out = session
            .annotate(&mut fake_extractor(), &frame, &Gallery::default())
            .unwrap();
        assert!(out.faces.iter().all(|f| !f.accepted && f.score == 0.0));
        assert_eq!(out.faces[1].label, "unknown_1");
    }
}
