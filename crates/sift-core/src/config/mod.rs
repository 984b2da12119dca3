mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings no store or splitter can run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be positive");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be positive");
        }
        if self.chunking.target_size == 0 {
            bail!("chunking.target_size must be positive");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be positive");
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            bail!(
                "retrieval.min_similarity must be within [0, 1], got {}",
                self.retrieval.min_similarity
            );
        }
        if self.ingest.batch_size == 0 {
            bail!("ingest.batch_size must be positive");
        }
        if self.store.collection.is_empty() {
            bail!("store.collection must not be empty");
        }
        if self.chunking.overlap >= self.chunking.target_size {
            tracing::warn!(
                overlap = self.chunking.overlap,
                target_size = self.chunking.target_size,
                "chunking.overlap will be clamped below target_size"
            );
        }
        Ok(())
    }
}
