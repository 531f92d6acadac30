//! facegate-core: face enrollment and recognition engine.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings,
//! both running via ONNX Runtime for CPU inference. Identities live in a
//! directory of enrollment photos, matched by cosine similarity.

pub mod alignment;
pub mod annotate;
pub mod detector;
pub mod enrollment;
pub mod gallery;
pub mod pipeline;
pub mod recognizer;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use annotate::Annotator;
pub use detector::OnnxDetector;
pub use enrollment::{EnrollmentPhase, EnrollmentStatus, EnrollmentWorkflow};
pub use gallery::{Gallery, GalleryStore};
pub use pipeline::{ExtractedFace, FaceDetector, FaceEmbedder, FaceExtractor};
pub use recognizer::OnnxEmbedder;
pub use session::{AnnotatedFrame, RecognitionSession, RecognizedFace};
pub use types::{
    CosineMatcher, Embedding, EnrollmentRecord, FaceRegion, MatchResult, Matcher,
    COSINE_THRESHOLD,
};

/// Extraction pipeline backed by the ONNX models.
pub type OnnxExtractor = FaceExtractor<OnnxDetector, OnnxEmbedder>;
