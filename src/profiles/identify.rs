//! Nearest-neighbor artist identification over the profile bank.

use super::bank::ProfileBank;
use crate::signature::{distance, Signature, SignatureScheme};
use tracing::debug;

/// Best-effort nearest-match identification under a tunable threshold.
/// Never a guarantee of correctness.
pub struct IdentificationEngine {
    scheme: SignatureScheme,
    threshold: f64,
}

impl IdentificationEngine {
    /// `threshold` is scheme-dependent: tight for the cosine form of the
    /// embedding scheme, wider for raw Euclidean energy profiles. Supplied
    /// by configuration, never hardcoded at call sites.
    pub fn new(scheme: SignatureScheme, threshold: f64) -> Self {
        Self { scheme, threshold }
    }

    /// Return the artist whose reference signature is globally closest to
    /// the input, if that minimum distance is strictly below the threshold.
    ///
    /// Equal minimal distances across artists resolve to whichever artist
    /// the bank iterates first — stable but arbitrary. Signatures of the
    /// wrong scheme are never matched; an empty bank yields `None`.
    pub fn identify(&self, bank: &ProfileBank, signature: &Signature) -> Option<String> {
        if !signature.matches_scheme(self.scheme) {
            debug!(
                got = %signature.scheme,
                expected = %self.scheme,
                "Identification skipped for non-current scheme"
            );
            return None;
        }

        let mut best: Option<(&str, f64)> = None;
        for (artist, reference) in bank.all_signatures() {
            let dist = distance(signature, reference);
            if best.map(|(_, d)| dist < d).unwrap_or(true) {
                best = Some((artist, dist));
            }
        }

        match best {
            Some((artist, dist)) if dist < self.threshold => {
                debug!(artist, distance = dist, "Identified possible author");
                Some(artist.to_string())
            }
            _ => None,
        }
    }
}
