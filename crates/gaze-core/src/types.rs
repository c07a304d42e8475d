use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in image-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// True when the box has no usable area (zero/negative size or non-finite).
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.x < 0.0 || self.y < 0.0 || self.width <= 0.0 || self.height <= 0.0
    }

    /// True when the box lies entirely inside an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_degenerate()
            && self.x + self.width <= width as f32
            && self.y + self.height <= height as f32
    }
}

/// Face embedding vector (dimensionality fixed by the extractor, e.g. 128).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "sface_2021dec").
    #[serde(default)]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// L2 norm of the vector.
    pub fn norm(&self) -> f32 {
        self.values
            .iter()
            .map(|&v| f64::from(v) * f64::from(v))
            .sum::<f64>()
            .sqrt() as f32
    }

    /// A usable embedding is non-empty, finite and has non-zero norm.
    pub fn is_valid(&self) -> bool {
        !self.values.is_empty()
            && self.values.iter().all(|v| v.is_finite())
            && self.norm() > 0.0
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. Zero-norm vectors and
    /// mismatched dimensionality score 0.0 rather than dividing by zero.
    /// Always processes all dimensions. Accumulates in f64 so neither very
    /// small nor very large components under- or overflow.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }

        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (f64::from(a), f64::from(b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        let sim = if denom > 0.0 { dot / denom } else { 0.0 };
        if sim.is_finite() {
            sim.clamp(-1.0, 1.0) as f32
        } else {
            0.0
        }
    }

    /// Element-wise arithmetic mean of a batch of equally-sized embeddings.
    ///
    /// Returns `None` for an empty batch or mixed dimensionality.
    pub fn mean(samples: &[Embedding]) -> Option<Embedding> {
        let first = samples.first()?;
        let dim = first.dim();
        if samples.iter().any(|s| s.dim() != dim) {
            return None;
        }

        let mut acc = vec![0.0f64; dim];
        for sample in samples {
            for (slot, v) in acc.iter_mut().zip(sample.values.iter()) {
                *slot += f64::from(*v);
            }
        }
        let n = samples.len() as f64;

        Some(Embedding {
            values: acc.into_iter().map(|v| (v / n) as f32).collect(),
            model_version: first.model_version.clone(),
        })
    }
}

/// An enrolled person: a unique name and the averaged template embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub template: Embedding,
    /// Number of valid samples averaged into the template.
    #[serde(default)]
    pub sample_count: usize,
    pub enrolled_at: DateTime<Utc>,
}

/// Result of matching a probe embedding against the enrolled identities.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Name of the matched identity (only set when `matched`).
    pub name: Option<String>,
    /// Cosine similarity of the best candidate [-1, 1], 0.0 when there was none.
    pub score: f32,
}

impl MatchResult {
    /// The "no signal" result: nothing to compare, or extraction failed upstream.
    pub fn no_match() -> Self {
        Self {
            matched: false,
            name: None,
            score: 0.0,
        }
    }
}

/// Strategy for comparing a probe embedding against enrolled identities.
pub trait Matcher {
    fn identify(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher with full gallery traversal.
///
/// Always iterates ALL gallery entries so timing does not leak the match
/// position. Ties keep the first identity encountered.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn identify(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> MatchResult {
        if !probe.is_valid() {
            return MatchResult::no_match();
        }

        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, identity) in gallery.iter().enumerate() {
            let sim = probe.similarity(&identity.template);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                name: Some(gallery[idx].name.clone()),
                score: best_sim,
            },
            Some(_) => MatchResult {
                matched: false,
                name: None,
                score: best_sim,
            },
            None => MatchResult::no_match(),
        }
    }
}
