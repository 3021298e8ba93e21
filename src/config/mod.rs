mod file_config;

pub use file_config::FileConfig;

use crate::signature::{EmbeddingClientConfig, SignatureScheme};
use anyhow::{bail, Result};
use std::path::PathBuf;

/// Engine tunables shared by identification and training.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// The signature scheme this deployment extracts and compares.
    pub active_scheme: SignatureScheme,
    /// Maximum reference signatures retained per artist.
    pub bank_cap: usize,
    /// Match threshold for Euclidean distances over energy profiles.
    pub energy_threshold: f64,
    /// Match threshold for cosine distances over embeddings.
    pub embedding_threshold: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            active_scheme: SignatureScheme::EnergyProfile,
            bank_cap: 20,
            energy_threshold: 1.0,
            embedding_threshold: 0.05,
        }
    }
}

impl EngineSettings {
    /// The acceptance threshold for the active scheme.
    pub fn match_threshold(&self) -> f64 {
        match self.active_scheme {
            SignatureScheme::EnergyProfile => self.energy_threshold,
            SignatureScheme::Embedding => self.embedding_threshold,
        }
    }
}

/// CLI arguments that participate in config resolution.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub media_path: Option<PathBuf>,
    pub scheme: Option<String>,
    pub bank_cap: Option<usize>,
    pub embedding_url: Option<String>,
    pub embedding_timeout_sec: Option<u64>,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub media_path: PathBuf,
    pub engine: EngineSettings,
    /// Present when the embedding scheme is active.
    pub embedding: Option<EmbeddingClientConfig>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and an optional TOML file.
    /// File values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via CLI or in the config file")
            })?;

        let media_path = file
            .media_path
            .map(PathBuf::from)
            .or_else(|| cli.media_path.clone())
            .unwrap_or_else(|| {
                db_path
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        let scheme_name = file.scheme.or_else(|| cli.scheme.clone());
        let active_scheme = match scheme_name.as_deref() {
            None | Some("energy_profile") => SignatureScheme::EnergyProfile,
            Some("embedding") => SignatureScheme::Embedding,
            Some(other) => bail!(
                "Unknown scheme '{}', expected 'energy_profile' or 'embedding'",
                other
            ),
        };

        let defaults = EngineSettings::default();
        let engine = EngineSettings {
            active_scheme,
            bank_cap: file.bank_cap.or(cli.bank_cap).unwrap_or(defaults.bank_cap),
            energy_threshold: file.energy_threshold.unwrap_or(defaults.energy_threshold),
            embedding_threshold: file
                .embedding_threshold
                .unwrap_or(defaults.embedding_threshold),
        };
        if engine.bank_cap == 0 {
            bail!("bank_cap must be at least 1");
        }

        let embedding_url = file.embedding_url.or_else(|| cli.embedding_url.clone());
        let embedding = match (active_scheme, embedding_url) {
            (SignatureScheme::Embedding, Some(base_url)) => Some(EmbeddingClientConfig {
                base_url,
                timeout_sec: file
                    .embedding_timeout_sec
                    .or(cli.embedding_timeout_sec)
                    .unwrap_or_else(|| EmbeddingClientConfig::default().timeout_sec),
            }),
            (SignatureScheme::Embedding, None) => {
                bail!("The embedding scheme requires an embedding service URL")
            }
            (SignatureScheme::EnergyProfile, _) => None,
        };

        Ok(Self {
            db_path,
            media_path,
            engine,
            embedding,
        })
    }
}
