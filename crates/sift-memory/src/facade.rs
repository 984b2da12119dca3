//! Backend selection with fallback to the alternate backend.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::collection::{CollectionEngine, CollectionStore, LocalEngine, QdrantEngine};
use crate::error::{Result, StoreError};
use crate::flat::FlatIndexStore;
use crate::types::{ChunkId, EmbeddedChunk, ScoredChunk, StoreStats};
use crate::vector_store::{BoxFuture, VectorStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Flat,
    #[default]
    Collection,
}

impl BackendKind {
    #[must_use]
    pub fn alternate(self) -> Self {
        match self {
            Self::Flat => Self::Collection,
            Self::Collection => Self::Flat,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Collection => "collection",
        }
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" | "faiss" => Ok(Self::Flat),
            "collection" | "chroma" => Ok(Self::Collection),
            other => Err(StoreError::Validation(format!("unknown backend: {other}"))),
        }
    }
}

/// Engine behind the collection backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// JSON files under the store path.
    #[default]
    Local,
    Qdrant,
}

impl FromStr for EngineKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            other => Err(StoreError::Validation(format!("unknown engine: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub dimension: usize,
    /// Directory for the flat file pair and local collections.
    pub path: PathBuf,
    pub collection: String,
    pub engine: EngineKind,
    pub qdrant_url: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            dimension: 384,
            path: PathBuf::from("./data/vectorstore"),
            collection: "discourse_posts".into(),
            engine: EngineKind::Local,
            qdrant_url: "http://localhost:6334".into(),
        }
    }
}

/// Generates a match over all `AnyStore` variants, binding the inner store.
macro_rules! delegate_store {
    ($self:expr, |$s:ident| $expr:expr) => {
        match $self {
            AnyStore::Flat($s) => $expr,
            AnyStore::Collection($s) => $expr,
        }
    };
}

#[derive(Debug)]
pub enum AnyStore {
    Flat(FlatIndexStore),
    Collection(CollectionStore),
}

impl AnyStore {
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Flat(_) => BackendKind::Flat,
            Self::Collection(_) => BackendKind::Collection,
        }
    }
}

impl VectorStore for AnyStore {
    fn backend(&self) -> &'static str {
        delegate_store!(self, |s| s.backend())
    }

    fn add(&self, docs: Vec<EmbeddedChunk>) -> BoxFuture<'_, Result<usize>> {
        delegate_store!(self, |s| s.add(docs))
    }

    fn upsert(&self, docs: Vec<EmbeddedChunk>) -> BoxFuture<'_, Result<usize>> {
        delegate_store!(self, |s| s.upsert(docs))
    }

    fn search(&self, query: Vec<f32>, top_k: usize) -> BoxFuture<'_, Result<Vec<ScoredChunk>>> {
        delegate_store!(self, |s| s.search(query, top_k))
    }

    fn delete(&self, ids: Vec<ChunkId>) -> BoxFuture<'_, Result<usize>> {
        delegate_store!(self, |s| s.delete(ids))
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        delegate_store!(self, |s| s.clear())
    }

    fn stats(&self) -> BoxFuture<'_, Result<StoreStats>> {
        delegate_store!(self, |s| s.stats())
    }

    fn persist(&self) -> BoxFuture<'_, Result<()>> {
        delegate_store!(self, |s| s.persist())
    }
}

fn open_flat(opts: &StoreOptions) -> Result<AnyStore> {
    Ok(AnyStore::Flat(FlatIndexStore::open(&opts.path, opts.dimension)?))
}

async fn open_collection(opts: &StoreOptions) -> Result<AnyStore> {
    let engine: Box<dyn CollectionEngine> = match opts.engine {
        EngineKind::Local => Box::new(LocalEngine::open(&opts.path)?),
        EngineKind::Qdrant => Box::new(QdrantEngine::new(&opts.qdrant_url)?),
    };
    let store = CollectionStore::open(engine, opts.collection.clone(), opts.dimension).await?;
    Ok(AnyStore::Collection(store))
}

/// Open a single backend, mapping any failure to [`StoreError::BackendUnavailable`].
///
/// # Errors
///
/// Returns [`StoreError::BackendUnavailable`] if the backend fails to initialize.
pub async fn open_backend(kind: BackendKind, opts: &StoreOptions) -> Result<AnyStore> {
    let opened = match kind {
        BackendKind::Flat => open_flat(opts),
        BackendKind::Collection => open_collection(opts).await,
    };
    opened.map_err(|e| StoreError::BackendUnavailable {
        backend: kind.as_str(),
        reason: e.to_string(),
    })
}

/// Open `preferred`, falling back to its alternate if it fails to initialize.
///
/// # Errors
///
/// Returns [`StoreError::NoBackendAvailable`] if both backends fail.
pub async fn get_store(preferred: BackendKind, opts: &StoreOptions) -> Result<AnyStore> {
    let first = match open_backend(preferred, opts).await {
        Ok(store) => {
            tracing::info!(backend = preferred.as_str(), "vector store initialized");
            return Ok(store);
        }
        Err(e) => e,
    };

    let alternate = preferred.alternate();
    tracing::warn!(
        preferred = preferred.as_str(),
        alternate = alternate.as_str(),
        error = %first,
        "preferred backend failed, falling back"
    );
    match open_backend(alternate, opts).await {
        Ok(store) => Ok(store),
        Err(second) => {
            tracing::error!(
                backend = alternate.as_str(),
                error = %second,
                "alternate backend failed"
            );
            Err(StoreError::NoBackendAvailable {
                preferred: preferred.as_str(),
                alternate: alternate.as_str(),
            })
        }
    }
}
