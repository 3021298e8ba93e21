//! Acoustic signatures and the similarity metric used to compare them.
//!
//! A signature is a fixed-length vector summarizing a track's acoustic
//! content. Two extraction schemes coexist in catalog history:
//! - `EnergyProfile`: handcrafted 10-dim energy statistics, compared with
//!   Euclidean distance.
//! - `Embedding`: learned 1024-dim embedding (mean-pooled over time),
//!   compared with `1 - cosine_similarity`.
//!
//! Signatures from different schemes are never compared; the metric
//! reports them as incomparable instead of erroring.

mod embedding_client;
mod energy_profile;
mod provider;

pub use embedding_client::{EmbeddingClient, EmbeddingClientConfig};
pub use energy_profile::EnergyProfileExtractor;
pub use provider::{ExtractionError, SignatureProvider};

use serde::{Deserialize, Serialize};

/// Distance reported for signatures that cannot be meaningfully compared
/// (scheme or length mismatch). Never below any sane match threshold.
pub const INCOMPARABLE: f64 = f64::INFINITY;

/// Extraction scheme a signature was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// Handcrafted segment-energy statistics.
    EnergyProfile,
    /// Learned audio embedding.
    Embedding,
}

impl SignatureScheme {
    /// Fixed dimensionality of vectors produced under this scheme.
    pub fn dimensions(&self) -> usize {
        match self {
            SignatureScheme::EnergyProfile => 10,
            SignatureScheme::Embedding => 1024,
        }
    }
}

impl std::fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureScheme::EnergyProfile => write!(f, "energy_profile"),
            SignatureScheme::Embedding => write!(f, "embedding"),
        }
    }
}

/// A scheme-tagged acoustic signature.
///
/// The tag travels with the vector so that bank membership and comparisons
/// are scheme-aware rather than inferred from vector length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub scheme: SignatureScheme,
    pub values: Vec<f32>,
}

impl Signature {
    pub fn new(scheme: SignatureScheme, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), scheme.dimensions());
        Self { scheme, values }
    }

    /// Whether this signature belongs to the given deployment scheme.
    /// Anything else is a legacy signature, treated as absent/pending.
    pub fn matches_scheme(&self, scheme: SignatureScheme) -> bool {
        self.scheme == scheme && self.values.len() == scheme.dimensions()
    }
}

/// Distance between two signatures. Lower is more similar.
///
/// Contract: `distance(x, x)` is ~0, symmetric, and monotonic with reduced
/// similarity. Scheme or length mismatches yield [`INCOMPARABLE`] rather
/// than an error.
pub fn distance(a: &Signature, b: &Signature) -> f64 {
    if a.scheme != b.scheme || a.values.len() != b.values.len() {
        return INCOMPARABLE;
    }
    match a.scheme {
        SignatureScheme::EnergyProfile => euclidean(&a.values, &b.values),
        SignatureScheme::Embedding => cosine_distance(&a.values, &b.values),
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// `1 - cosine_similarity`: 0 for identical direction, growing with
/// dissimilarity. Zero-magnitude inputs are reported as fully dissimilar.
fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut mag_a = 0f64;
    let mut mag_b = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        mag_a += (*x as f64) * (*x as f64);
        mag_b += (*y as f64) * (*y as f64);
    }
    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (mag_a.sqrt() * mag_b.sqrt())
}
