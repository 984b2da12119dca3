use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sift_memory::document::{IngestConfig, SplitterConfig};
use sift_memory::{BackendKind, EngineKind, RetrievalConfig, StoreOptions};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: SplitterConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestSection,
}

fn default_dimension() -> usize {
    384
}

fn default_embed_batch_size() -> usize {
    32
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Length of every stored vector.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Texts per embedder call.
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            batch_size: default_embed_batch_size(),
        }
    }
}

fn default_store_path() -> String {
    "./data/vectorstore".into()
}

fn default_collection() -> String {
    "discourse_posts".into()
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Preferred backend; the other one is tried if it fails to open.
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub engine: EngineKind,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            path: default_store_path(),
            collection: default_collection(),
            engine: EngineKind::default(),
            qdrant_url: default_qdrant_url(),
        }
    }
}

fn default_ingest_batch_size() -> usize {
    100
}

fn default_min_words() -> usize {
    8
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IngestSection {
    /// Chunks per store upsert.
    #[serde(default = "default_ingest_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            batch_size: default_ingest_batch_size(),
            min_words: default_min_words(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            dimension: self.embedding.dimension,
            path: PathBuf::from(&self.store.path),
            collection: self.store.collection.clone(),
            engine: self.store.engine,
            qdrant_url: self.store.qdrant_url.clone(),
        }
    }

    #[must_use]
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            batch_size: self.ingest.batch_size,
            embed_batch_size: self.embedding.batch_size,
            min_words: self.ingest.min_words,
        }
    }
}
