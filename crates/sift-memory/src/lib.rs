//! Chunk indexing and vector retrieval over interchangeable storage backends.
//!
//! Text is split by [`document::TextSplitter`], embedded through an
//! [`embedding::Embedder`], and written into a [`vector_store::VectorStore`]:
//! either the file-persisted [`flat::FlatIndexStore`] or a
//! [`collection::CollectionStore`] on top of a collection engine.

pub mod collection;
pub mod document;
pub mod embedding;
pub mod error;
pub mod facade;
pub mod flat;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod retriever;
pub mod types;
pub mod vector_store;

pub use collection::{CollectionStore, LocalEngine, QdrantEngine};
pub use embedding::{EmbedError, Embedder, fallback_vector};
pub use error::{EngineError, StoreError};
pub use facade::{AnyStore, BackendKind, EngineKind, StoreOptions, get_store};
pub use flat::FlatIndexStore;
pub use retriever::{RetrievalConfig, Retriever};
pub use types::{
    Chunk, ChunkId, EmbeddedChunk, Embedding, MetaValue, Metadata, ScoredChunk, StoreStats,
};
pub use vector_store::VectorStore;
