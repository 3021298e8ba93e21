//! Per-artist reference signature bank.

use crate::catalog::UNKNOWN_ARTIST;
use crate::signature::Signature;
use std::collections::BTreeMap;

/// Capacity-bounded collection of reference signatures per artist, used as
/// a nearest-neighbor classifier.
///
/// Iteration order is deterministic (alphabetical by artist, insertion
/// order within an artist), which pins down the documented stable but
/// arbitrary tie-break during identification.
///
/// Once an artist's bucket reaches capacity further inserts are dropped,
/// so the oldest samples are the ones retained. Kept as observed in the
/// field; whether most-recent samples would serve better is an open
/// product question.
pub struct ProfileBank {
    cap: usize,
    profiles: BTreeMap<String, Vec<Signature>>,
}

impl ProfileBank {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            profiles: BTreeMap::new(),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Insert a reference signature. No-op for the Unknown sentinel and
    /// for artists whose bucket is already at capacity.
    pub fn insert(&mut self, artist: &str, signature: Signature) {
        if artist == UNKNOWN_ARTIST {
            return;
        }
        let bucket = self.profiles.entry(artist.to_string()).or_default();
        if bucket.len() < self.cap {
            bucket.push(signature);
        }
    }

    pub fn clear(&mut self) {
        self.profiles.clear();
    }

    /// All `(artist, signature)` pairs in deterministic order.
    pub fn all_signatures(&self) -> impl Iterator<Item = (&str, &Signature)> {
        self.profiles
            .iter()
            .flat_map(|(artist, sigs)| sigs.iter().map(move |s| (artist.as_str(), s)))
    }

    pub fn sample_count(&self, artist: &str) -> usize {
        self.profiles.get(artist).map(Vec::len).unwrap_or(0)
    }

    pub fn artist_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn total_samples(&self) -> usize {
        self.profiles.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
