//! HTTP client for the external embedding inference service.
//!
//! The service decodes audio and runs the embedding model; this client
//! mean-pools the per-frame embeddings it returns into a single track
//! signature. The handshake with the service is lazy and single-flight:
//! concurrent extractions share one in-flight attempt instead of starting
//! duplicate ones, and a failed attempt surfaces to its waiters while later
//! calls may retry.

use super::provider::{ExtractionError, SignatureProvider};
use super::{Signature, SignatureScheme};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Configuration for the embedding service client.
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    /// Base URL of the inference service (e.g. "http://localhost:9200").
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_sec: u64,
}

impl Default for EmbeddingClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9200".to_string(),
            timeout_sec: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    model: String,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    /// Per-frame embeddings, one row per analysis frame.
    frames: Vec<Vec<f32>>,
}

/// Signature provider backed by a remote embedding model.
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    ready: OnceCell<()>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ready: OnceCell::new(),
        }
    }

    /// Verify the service is up and serves the expected vector size.
    async fn handshake(&self) -> Result<(), ExtractionError> {
        let url = format!("{}/model", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExtractionError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::BackendUnavailable(format!(
                "model info request failed with status {}",
                response.status()
            )));
        }

        let info: ModelInfo = response
            .json()
            .await
            .map_err(|e| ExtractionError::BackendUnavailable(e.to_string()))?;

        let expected = SignatureScheme::Embedding.dimensions();
        if info.dimensions != expected {
            return Err(ExtractionError::BackendUnavailable(format!(
                "model {} serves {}-dim vectors, expected {}",
                info.model, info.dimensions, expected
            )));
        }

        info!(model = %info.model, dimensions = info.dimensions, "Embedding service ready");
        Ok(())
    }
}

#[async_trait]
impl SignatureProvider for EmbeddingClient {
    async fn extract(&self, audio: &[u8]) -> Result<Signature, ExtractionError> {
        // Single-flight init: concurrent callers await the same attempt.
        self.ready.get_or_try_init(|| self.handshake()).await?;

        let url = format!("{}/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| ExtractionError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::Decode(format!(
                "embedding request failed with status {}",
                response.status()
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Decode(e.to_string()))?;

        let pooled = mean_pool(&body.frames)?;
        debug!(frames = body.frames.len(), "Pooled embedding frames");
        Ok(Signature::new(SignatureScheme::Embedding, pooled))
    }
}

/// Average per-frame embeddings into one track-level vector.
fn mean_pool(frames: &[Vec<f32>]) -> Result<Vec<f32>, ExtractionError> {
    let dims = SignatureScheme::Embedding.dimensions();
    if frames.is_empty() {
        return Err(ExtractionError::Decode(
            "embedding service returned no frames".to_string(),
        ));
    }
    if frames.iter().any(|f| f.len() != dims) {
        return Err(ExtractionError::Decode(format!(
            "frame dimensionality mismatch, expected {}",
            dims
        )));
    }

    let mut pooled = vec![0f32; dims];
    for frame in frames {
        for (acc, v) in pooled.iter_mut().zip(frame.iter()) {
            *acc += v;
        }
    }
    let n = frames.len() as f32;
    for v in &mut pooled {
        *v /= n;
    }
    Ok(pooled)
}
