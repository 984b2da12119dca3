//! Config path resolution and construction of the store, retriever and pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use sift_memory::document::{IngestionPipeline, TextSplitter};
use sift_memory::{BackendKind, Embedder, Retriever, VectorStore, get_store};

use crate::config::Config;

/// Priority: explicit `--config` path, then `SIFT_CONFIG`, then `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SIFT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// The one store instance for this process, plus the config it was opened with.
pub struct AppContext {
    config: Config,
    store: Arc<dyn VectorStore>,
    backend: BackendKind,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("backend", &self.backend)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Validate `config` and open its preferred backend, falling back to the alternate.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or no backend can be opened.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let store = get_store(config.store.backend, &config.store_options())
            .await
            .context("failed to open vector store")?;
        let backend = store.kind();
        if backend != config.store.backend {
            tracing::warn!(
                configured = config.store.backend.as_str(),
                active = backend.as_str(),
                "running on the alternate backend"
            );
        }
        Ok(Self {
            config,
            store: Arc::new(store),
            backend,
        })
    }

    /// Load from `path` (see [`resolve_config_path`]) and open.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, validation or store initialization fails.
    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(path)?;
        Self::open(config).await
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Backend actually in use, which differs from the configured one after a fallback.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn splitter(&self) -> TextSplitter {
        TextSplitter::new(self.config.chunking.clone())
    }

    #[must_use]
    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.store(), self.config.retrieval.clone())
    }

    #[must_use]
    pub fn pipeline(&self, embedder: Arc<dyn Embedder>) -> IngestionPipeline {
        if embedder.dimension() != self.config.embedding.dimension {
            tracing::warn!(
                embedder = embedder.dimension(),
                configured = self.config.embedding.dimension,
                "embedder dimension differs from embedding.dimension"
            );
        }
        IngestionPipeline::new(
            self.splitter(),
            self.store(),
            embedder,
            self.config.ingest_config(),
        )
    }
}
