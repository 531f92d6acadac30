//! Enrollment state machine: capture one face, label it, persist it.
//!
//! ```text
//! Idle ──capture(1 face)──▶ Captured ──save(label)──▶ Labeled ──write+reload──▶ Saved
//!  ▲   capture(0 / >1 faces)    │ save(empty label)                              │
//!  └────────────────────────────┴──────────────── acknowledge() / reset() ◀──────┘
//! ```
//!
//! Transitions return an [`EnrollmentStatus`] for the driver to show. Hard
//! failures (disk, inference backend) come back as [`EnrollmentError`] and
//! leave the workflow in `Idle`.

use crate::gallery::{enrollment_file_name, next_enrollment_ordinal, GalleryError, GalleryStore};
use crate::pipeline::{ExtractionError, FaceDetector, FaceEmbedder, FaceExtractor};
use crate::types::{Embedding, FaceRegion};
use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("gallery reload failed: {0}")]
    Gallery(#[from] GalleryError),
}

/// Outcome of a transition, suitable for direct display.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentStatus {
    NoFaceDetected,
    TooManyFaces(usize),
    Captured,
    NothingCaptured,
    EmptyLabel,
    InvalidLabel,
    Saved {
        label: String,
        path: PathBuf,
        gallery_size: usize,
    },
}

impl EnrollmentStatus {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoFaceDetected => "no face detected",
            Self::TooManyFaces(_) => "too many faces",
            Self::Captured => "face captured",
            Self::NothingCaptured => "no face captured",
            Self::EmptyLabel => "empty label",
            Self::InvalidLabel => "invalid label",
            Self::Saved { .. } => "saved successfully",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Captured | Self::Saved { .. })
    }
}

/// The single face retained between capture and save.
#[derive(Debug, Clone)]
pub struct CapturedFace {
    pub region: FaceRegion,
    pub embedding: Embedding,
    /// Unannotated copy of the captured frame.
    pub frame: RgbImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentPhase {
    Idle,
    Captured,
    Labeled,
    Saved,
}

#[derive(Debug)]
enum State {
    Idle,
    Captured(CapturedFace),
    Labeled { face: CapturedFace, label: String },
    Saved { label: String, path: PathBuf },
}

#[derive(Debug)]
pub struct EnrollmentWorkflow {
    state: State,
}

impl Default for EnrollmentWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrollmentWorkflow {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    pub fn phase(&self) -> EnrollmentPhase {
        match self.state {
            State::Idle => EnrollmentPhase::Idle,
            State::Captured(_) => EnrollmentPhase::Captured,
            State::Labeled { .. } => EnrollmentPhase::Labeled,
            State::Saved { .. } => EnrollmentPhase::Saved,
        }
    }

    pub fn captured(&self) -> Option<&CapturedFace> {
        match &self.state {
            State::Captured(face) | State::Labeled { face, .. } => Some(face),
            _ => None,
        }
    }

    /// Detect faces in a still frame; exactly one advances to `Captured`.
    ///
    /// Any earlier capture is discarded first.
    pub fn capture<D, E>(
        &mut self,
        frame: &RgbImage,
        extractor: &mut FaceExtractor<D, E>,
    ) -> Result<EnrollmentStatus, EnrollmentError>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        self.state = State::Idle;
        let mut faces = extractor.extract(frame)?;

        let status = match faces.len() {
            0 => EnrollmentStatus::NoFaceDetected,
            1 => {
                let face = faces.remove(0);
                self.state = State::Captured(CapturedFace {
                    region: face.region,
                    embedding: face.embedding,
                    frame: frame.clone(),
                });
                EnrollmentStatus::Captured
            }
            n => EnrollmentStatus::TooManyFaces(n),
        };

        tracing::info!(status = status.message(), "enrollment capture");
        Ok(status)
    }

    /// Label the captured face, write it to the gallery directory and reload
    /// the store. Equivalent to [`label`](Self::label) then
    /// [`commit`](Self::commit).
    pub fn save<D, E>(
        &mut self,
        label: &str,
        store: &GalleryStore,
        extractor: &mut FaceExtractor<D, E>,
    ) -> Result<EnrollmentStatus, EnrollmentError>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        match self.label(label) {
            None => self.commit(store, extractor),
            Some(status) => Ok(status),
        }
    }

    /// Attach a label to the captured face (`Captured → Labeled`).
    ///
    /// Returns a failure status, or `None` once labeled. An empty or
    /// path-like label drops the capture and returns to `Idle`.
    pub fn label(&mut self, label: &str) -> Option<EnrollmentStatus> {
        let face = match std::mem::replace(&mut self.state, State::Idle) {
            State::Captured(face) | State::Labeled { face, .. } => face,
            other => {
                self.state = other;
                return Some(EnrollmentStatus::NothingCaptured);
            }
        };

        let label = label.trim();
        if label.is_empty() {
            tracing::info!("enrollment rejected: empty label");
            return Some(EnrollmentStatus::EmptyLabel);
        }
        if !is_valid_label(label) {
            tracing::info!(label, "enrollment rejected: invalid label");
            return Some(EnrollmentStatus::InvalidLabel);
        }

        self.state = State::Labeled {
            face,
            label: label.to_string(),
        };
        None
    }

    /// Persist the labeled face and reload the store (`Labeled → Saved`).
    ///
    /// The file is `<ordinal>_<label>.png`, where the ordinal is the gallery
    /// size or one past the highest numbered file on disk, whichever is
    /// larger. The new file therefore never overwrites an existing one and
    /// always wins its label on reload.
    pub fn commit<D, E>(
        &mut self,
        store: &GalleryStore,
        extractor: &mut FaceExtractor<D, E>,
    ) -> Result<EnrollmentStatus, EnrollmentError>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        let (face, label) = match std::mem::replace(&mut self.state, State::Idle) {
            State::Labeled { face, label } => (face, label),
            other => {
                self.state = other;
                return Ok(EnrollmentStatus::NothingCaptured);
            }
        };

        let directory = store.directory();
        std::fs::create_dir_all(directory).map_err(|e| EnrollmentError::Write {
            path: directory.to_path_buf(),
            source: image::ImageError::IoError(e),
        })?;

        let ordinal = next_enrollment_ordinal(directory, store.snapshot().len())?;
        let path = directory.join(enrollment_file_name(ordinal, &label));

        face.frame.save(&path).map_err(|source| EnrollmentError::Write {
            path: path.clone(),
            source,
        })?;
        let gallery_size = store.reload(extractor)?;

        tracing::info!(label, path = %path.display(), gallery_size, "enrollment saved");
        self.state = State::Saved {
            label: label.clone(),
            path: path.clone(),
        };

        Ok(EnrollmentStatus::Saved {
            label,
            path,
            gallery_size,
        })
    }

    /// Acknowledge a successful save, returning to `Idle`.
    pub fn acknowledge(&mut self) {
        if let State::Saved { label, path } = &self.state {
            tracing::debug!(label, path = %path.display(), "enrollment acknowledged");
            self.state = State::Idle;
        }
    }

    /// Drop any capture and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }
}

/// A label must be usable as a single file-name component.
fn is_valid_label(label: &str) -> bool {
    label != "."
        && !label.contains("..")
        && !label
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
}
