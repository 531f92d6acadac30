use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Minimum cosine similarity for a gallery match to be accepted (inclusive).
///
/// Tuned against [`Embedding::similarity`]; changing the similarity function
/// invalidates this value.
pub const COSINE_THRESHOLD: f32 = 0.5;

/// Axis-aligned face box in source-image pixels, with optional landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceRegion {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection-over-union with another box; 0.0 when either is empty.
    pub fn iou(&self, other: &FaceRegion) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. Zero-norm inputs
    /// score 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// A usable embedding has at least one dimension and no NaN/inf values.
    pub fn is_valid(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| v.is_finite())
    }
}

/// One enrolled identity: a label and its reference embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub label: String,
    pub embedding: Embedding,
    /// Image file the embedding was extracted from.
    pub source: PathBuf,
}

/// Result of matching a probe embedding against a gallery.
///
/// A rejected result always carries an empty label and a 0.0 score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub accepted: bool,
    pub label: String,
    /// Cosine similarity of the best match.
    pub score: f32,
}

impl MatchResult {
    pub fn rejected() -> Self {
        Self {
            accepted: false,
            label: String::new(),
            score: 0.0,
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[EnrollmentRecord],
        threshold: f32,
    ) -> MatchResult;
}

/// Cosine similarity matcher over the full gallery.
///
/// Always iterates ALL gallery entries. The running best starts at 0.0 and is
/// replaced on `>=`, so of several records tied at the maximum the one
/// iterated last wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[EnrollmentRecord],
        threshold: f32,
    ) -> MatchResult {
        let mut best_score = 0.0f32;
        let mut best_label = "";

        for record in gallery {
            let score = probe.similarity(&record.embedding);
            if score >= best_score {
                best_score = score;
                best_label = &record.label;
            }
        }

        if best_score < threshold {
            return MatchResult::rejected();
        }

        MatchResult {
            accepted: true,
            label: best_label.to_string(),
            score: best_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(label: &str, values: Vec<f32>) -> EnrollmentRecord {
        EnrollmentRecord {
            label: label.into(),
            embedding: Embedding::new(values),
            source: PathBuf::new(),
        }
    }

    /// Unit vector whose cosine similarity with [1, 0] is `cos`, up to rounding.
    fn at_cosine(cos: f32) -> Vec<f32> {
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_self_similarity_is_maximal() {
        let e = Embedding::new(vec![0.3, -1.2, 4.5, 0.01]);
        let others = [
            Embedding::new(vec![0.3, -1.2, 4.5, 0.02]),
            Embedding::new(vec![-0.3, 1.2, -4.5, 0.01]),
            Embedding::new(vec![1.0, 1.0, 1.0, 1.0]),
        ];
        let own = e.similarity(&e);
        assert_relative_eq!(own, 1.0, epsilon = 1e-6);
        for other in &others {
            assert!(e.similarity(other) <= own + 1e-6);
        }
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_embedding_validity() {
        assert!(Embedding::new(vec![0.1, 0.2]).is_valid());
        assert!(!Embedding::new(vec![]).is_valid());
        assert!(!Embedding::new(vec![0.1, f32::NAN]).is_valid());
        assert!(!Embedding::new(vec![f32::INFINITY]).is_valid());
    }

    #[test]
    fn test_cosine_matcher_scans_whole_gallery() {
        // Best match is the last entry
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            record("decoy1", vec![0.0, 1.0, 0.0]),
            record("decoy2", vec![0.0, 0.0, 1.0]),
            record("match", vec![1.0, 0.0, 0.0]),
        ];

        let result = CosineMatcher.compare(&probe, &gallery, COSINE_THRESHOLD);
        assert!(result.accepted);
        assert_eq!(result.label, "match");
        assert!((result.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_matcher_no_match() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![record("other", vec![0.0, 1.0, 0.0])];

        let result = CosineMatcher.compare(&probe, &gallery, COSINE_THRESHOLD);
        assert_eq!(result, MatchResult::rejected());
    }

    #[test]
    fn test_cosine_matcher_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = CosineMatcher.compare(&probe, &[], COSINE_THRESHOLD);
        assert!(!result.accepted);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.label, "");
    }

    #[test]
    fn test_cosine_matcher_later_tie_wins() {
        let probe = Embedding::new(vec![0.6, 0.8]);
        let gallery = vec![
            record("first", vec![0.6, 0.8]),
            record("second", vec![0.6, 0.8]),
        ];

        let result = CosineMatcher.compare(&probe, &gallery, COSINE_THRESHOLD);
        assert!(result.accepted);
        assert_eq!(result.label, "second");

        let reversed: Vec<_> = gallery.into_iter().rev().collect();
        let result = CosineMatcher.compare(&probe, &reversed, COSINE_THRESHOLD);
        assert_eq!(result.label, "first");
    }

    #[test]
    fn test_cosine_matcher_is_deterministic() {
        let probe = Embedding::new(vec![0.2, 0.9, -0.1]);
        let gallery = vec![
            record("a", vec![0.1, 0.8, 0.0]),
            record("b", vec![0.3, 0.7, -0.2]),
        ];
        let first = CosineMatcher.compare(&probe, &gallery, COSINE_THRESHOLD);
        for _ in 0..10 {
            assert_eq!(CosineMatcher.compare(&probe, &gallery, COSINE_THRESHOLD), first);
        }
    }

    #[test]
    fn test_below_threshold_rejects() {
        let gallery = vec![record("bob", vec![1.0, 0.0])];
        let probe = Embedding::new(at_cosine(0.42));
        assert_relative_eq!(probe.similarity(&gallery[0].embedding), 0.42, epsilon = 1e-6);

        let result = CosineMatcher.compare(&probe, &gallery, COSINE_THRESHOLD);
        assert_eq!(result, MatchResult::rejected());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let gallery = vec![record("bob", vec![1.0, 0.0, 0.0, 0.0])];
        // dot = 1, norms 2 and 1: exactly 0.5 in f32
        let probe = Embedding::new(vec![1.0, 1.0, 1.0, 1.0]);
        assert_eq!(probe.similarity(&gallery[0].embedding), 0.5);

        let result = CosineMatcher.compare(&probe, &gallery, COSINE_THRESHOLD);
        assert!(result.accepted);
        assert_eq!(result.label, "bob");
        assert_eq!(result.score, 0.5);
    }
}
