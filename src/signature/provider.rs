//! The signature extraction collaborator contract.

use super::Signature;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while extracting a signature.
///
/// Extraction failures are non-fatal to the catalog: the track is kept with
/// no signature and revisited on the next training pass.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Could not decode audio: {0}")]
    Decode(String),

    #[error("Audio too short for analysis ({samples} samples)")]
    TooShort { samples: usize },

    #[error("Signature backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Turns raw audio bytes into a fixed-length acoustic signature.
///
/// Implementations must be idempotent and side-effect-free on the catalog.
/// All signatures produced by one provider share a single scheme and
/// dimensionality.
#[async_trait]
pub trait SignatureProvider: Send + Sync {
    /// Extract a signature from raw audio bytes.
    async fn extract(&self, audio: &[u8]) -> Result<Signature, ExtractionError>;
}
