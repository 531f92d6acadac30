//! Enrolled-identity gallery backed by a directory of labeled face images.
//!
//! The directory is the source of truth. A [`Gallery`] is an immutable
//! snapshot built by scanning it; [`GalleryStore`] publishes snapshots and
//! replaces them wholesale on reload.

use crate::pipeline::{FaceDetector, FaceEmbedder, FaceExtractor};
use crate::types::{Embedding, EnrollmentRecord, MatchResult, Matcher};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Image extensions picked up by a scan (ASCII case-insensitive).
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("cannot read gallery directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Snapshot of enrolled identities, unique by label, in load order.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    records: Vec<EnrollmentRecord>,
}

impl Gallery {
    /// Scan `directory` and enroll the first face of every readable image.
    ///
    /// Load order is by ordinal prefix, then file name.
    /// Unreadable images and images without a face are skipped. When two
    /// files share a label the later one's embedding wins.
    pub fn load<D, E>(
        directory: &Path,
        extractor: &mut FaceExtractor<D, E>,
    ) -> Result<Self, GalleryError>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        let files = list_images(directory)?;
        let mut gallery = Gallery::default();

        for path in files {
            let image = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                    continue;
                }
            };

            let faces = match extractor.extract(&image) {
                Ok(faces) => faces,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping image: extraction failed"
                    );
                    continue;
                }
            };

            let Some(face) = faces.into_iter().next() else {
                tracing::debug!(path = %path.display(), "skipping image: no face detected");
                continue;
            };

            let Some(label) = label_for(&path) else {
                continue;
            };

            gallery.upsert(EnrollmentRecord {
                label,
                embedding: face.embedding,
                source: path,
            });
        }

        tracing::info!(
            count = gallery.len(),
            directory = %directory.display(),
            "faces loaded"
        );

        Ok(gallery)
    }

    /// Build a gallery from records in iteration order, applying the same
    /// last-write-wins rule as [`Gallery::load`].
    pub fn from_records(records: impl IntoIterator<Item = EnrollmentRecord>) -> Self {
        let mut gallery = Gallery::default();
        for record in records {
            gallery.upsert(record);
        }
        gallery
    }

    fn upsert(&mut self, record: EnrollmentRecord) {
        match self.records.iter_mut().find(|r| r.label == record.label) {
            Some(existing) => {
                tracing::warn!(
                    label = %record.label,
                    replaced = %existing.source.display(),
                    by = %record.source.display(),
                    "duplicate label; later image wins"
                );
                existing.embedding = record.embedding;
                existing.source = record.source;
            }
            None => self.records.push(record),
        }
    }

    pub fn records(&self) -> &[EnrollmentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&Embedding> {
        self.records
            .iter()
            .find(|r| r.label == label)
            .map(|r| &r.embedding)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.label.as_str())
    }

    pub fn identify(
        &self,
        matcher: &impl Matcher,
        probe: &Embedding,
        threshold: f32,
    ) -> MatchResult {
        matcher.compare(probe, &self.records, threshold)
    }
}

/// Single owner of the current gallery snapshot.
///
/// Readers take an `Arc` snapshot and keep a consistent view for as long as
/// they hold it; [`GalleryStore::reload`] swaps in a fully built replacement.
pub struct GalleryStore {
    directory: PathBuf,
    current: RwLock<Arc<Gallery>>,
}

impl GalleryStore {
    /// Load the gallery in `directory` and take ownership of it.
    pub fn open<D, E>(
        directory: impl Into<PathBuf>,
        extractor: &mut FaceExtractor<D, E>,
    ) -> Result<Self, GalleryError>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        let directory = directory.into();
        let gallery = Gallery::load(&directory, extractor)?;
        Ok(Self {
            directory,
            current: RwLock::new(Arc::new(gallery)),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn snapshot(&self) -> Arc<Gallery> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rescan the directory and publish the result. Returns the new size.
    ///
    /// On error the previous snapshot stays in place.
    pub fn reload<D, E>(&self, extractor: &mut FaceExtractor<D, E>) -> Result<usize, GalleryError>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        let gallery = Arc::new(Gallery::load(&self.directory, extractor)?);
        let len = gallery.len();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = gallery;
        Ok(len)
    }

    /// Publish a copy of the current gallery with `record` added (or
    /// replacing the record with the same label). Returns the new size.
    pub fn insert(&self, record: EnrollmentRecord) -> usize {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Gallery::clone(&current);
        next.upsert(record);
        let len = next.len();
        *current = Arc::new(next);
        len
    }
}

/// List supported images in `directory`, de-duplicated and in load order.
///
/// A missing directory is an empty gallery.
fn list_images(directory: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(directory = %directory.display(), "gallery directory does not exist");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(GalleryError::ReadDir {
                path: directory.to_path_buf(),
                source,
            })
        }
    };

    let unique: BTreeSet<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_supported(path))
        .collect();

    let mut files: Vec<PathBuf> = unique.into_iter().collect();
    files.sort_by(|a, b| scan_order(a).cmp(&scan_order(b)));
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

/// Sort key for gallery files: `(ordinal, file name)`.
///
/// Files without an ordinal prefix sort before numbered ones, so enrollments
/// written by [`crate::enrollment`] load last and in the order they were made.
fn scan_order(path: &Path) -> (Option<u64>, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ordinal = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(split_ordinal)
        .map(|(ordinal, _)| ordinal);
    (ordinal, name)
}

/// Split `"<digits>_<label>"` into its ordinal and label.
fn split_ordinal(stem: &str) -> Option<(u64, &str)> {
    let (prefix, rest) = stem.split_once('_')?;
    if rest.is_empty() || prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((prefix.parse().ok()?, rest))
}

/// Identity label for a gallery file: its stem, minus a writer ordinal.
pub fn label_for(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let label = match split_ordinal(&stem) {
        Some((_, label)) => label,
        None => &stem,
    };
    Some(label.to_string())
}

/// Ordinal for the next enrollment file in `directory`: at least `min`, and
/// above every numbered image already there, so the new file loads last.
pub fn next_enrollment_ordinal(directory: &Path, min: usize) -> Result<usize, GalleryError> {
    let highest = list_images(directory)?
        .iter()
        .filter_map(|path| path.file_stem()?.to_str().and_then(split_ordinal))
        .map(|(ordinal, _)| ordinal)
        .max();

    Ok(match highest {
        Some(n) => min.max(usize::try_from(n).unwrap_or(usize::MAX).saturating_add(1)),
        None => min,
    })
}

/// File name the enrollment writer uses for the `ordinal`-th image.
pub fn enrollment_file_name(ordinal: usize, label: &str) -> String {
    format!("{ordinal}_{label}.png")
}
