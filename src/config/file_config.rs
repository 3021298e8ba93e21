//! Optional TOML configuration file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// TOML-file configuration. Every field is optional; values present here
/// override CLI arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub media_path: Option<String>,
    /// `"energy_profile"` or `"embedding"`.
    pub scheme: Option<String>,
    pub bank_cap: Option<usize>,
    pub energy_threshold: Option<f64>,
    pub embedding_threshold: Option<f64>,
    pub embedding_url: Option<String>,
    pub embedding_timeout_sec: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bank_cap = 10\nscheme = \"embedding\"\nembedding_url = \"http://inference:9200\""
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.bank_cap, Some(10));
        assert_eq!(config.scheme.as_deref(), Some("embedding"));
        assert_eq!(
            config.embedding_url.as_deref(),
            Some("http://inference:9200")
        );
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "no_such_setting = true").unwrap();
        assert!(FileConfig::load(file.path()).is_err());
    }
}
