//! Collection-based backend: a named collection inside an engine that natively
//! supports id-addressed writes and reports distances with query hits.

pub mod engine;
pub mod local;
pub mod qdrant;

pub use engine::{CollectionEngine, EngineHit, EngineRecord};
pub use local::LocalEngine;
pub use qdrant::QdrantEngine;

use crate::error::{EngineError, Result, StoreError};
use crate::types::{ChunkId, EmbeddedChunk, ScoredChunk, StoreStats};
use crate::vector_store::{BoxFuture, VectorStore, validate_batch, validate_query};

const BACKEND: &str = "collection";

/// Map an engine distance to a similarity in `[0, 1]`.
///
/// Distances in `[0, 1]` map to `1 - d`; anything larger maps to `1 / (1 + d)`.
#[must_use]
pub fn distance_to_score(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    let score = if (0.0..=1.0).contains(&distance) {
        1.0 - distance
    } else {
        1.0 / (1.0 + distance)
    };
    score.max(0.0)
}

pub struct CollectionStore {
    engine: Box<dyn CollectionEngine>,
    collection: String,
    dimension: usize,
}

impl std::fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStore")
            .field("engine", &self.engine.name())
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl CollectionStore {
    /// Bind to `collection`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot create or open the collection.
    pub async fn open(
        engine: Box<dyn CollectionEngine>,
        collection: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(StoreError::Validation(
                "collection dimension must be positive".into(),
            ));
        }
        let collection = collection.into();
        engine.ensure_collection(&collection, dimension).await?;
        tracing::info!(
            backend = BACKEND,
            engine = engine.name(),
            collection = %collection,
            dimension,
            "collection store opened"
        );
        Ok(Self {
            engine,
            collection,
            dimension,
        })
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Add through the engine; ids it reports as duplicates are deleted and the batch
    /// is re-added. Convergent, not atomic.
    async fn write(&self, docs: Vec<EmbeddedChunk>) -> Result<usize> {
        validate_batch(&docs, Some(self.dimension))?;
        if docs.is_empty() {
            return Ok(0);
        }
        let records: Vec<EngineRecord> = docs
            .iter()
            .map(|d| EngineRecord {
                id: d.chunk.id.clone(),
                vector: d.embedding.vector().to_vec(),
                text: d.chunk.text.clone(),
                metadata: d.stored_metadata(),
            })
            .collect();
        let count = records.len();

        match self.engine.add(&self.collection, records.clone()).await {
            Ok(()) => Ok(count),
            Err(EngineError::DuplicateIds(ids)) => {
                tracing::debug!(
                    backend = BACKEND,
                    duplicates = ids.len(),
                    "replacing existing ids via delete-then-add"
                );
                let ids: Vec<ChunkId> = ids.into_iter().map(ChunkId::from).collect();
                if let Err(e) = self.engine.delete(&self.collection, ids).await {
                    tracing::warn!(backend = BACKEND, error = %e, "delete before re-add failed");
                }
                self.engine.add(&self.collection, records).await?;
                Ok(count)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl VectorStore for CollectionStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn add(&self, docs: Vec<EmbeddedChunk>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(self.write(docs))
    }

    fn upsert(&self, docs: Vec<EmbeddedChunk>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(self.write(docs))
    }

    fn search(&self, query: Vec<f32>, top_k: usize) -> BoxFuture<'_, Result<Vec<ScoredChunk>>> {
        Box::pin(async move {
            validate_query(&query, self.dimension)?;
            if top_k == 0 {
                return Ok(Vec::new());
            }
            let hits = self.engine.query(&self.collection, query, top_k).await?;
            let mut scored: Vec<ScoredChunk> = hits
                .into_iter()
                .map(|h| ScoredChunk {
                    id: h.id,
                    score: distance_to_score(h.distance),
                    text: h.text,
                    metadata: h.metadata,
                })
                .collect();
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(scored)
        })
    }

    fn delete(&self, ids: Vec<ChunkId>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(0);
            }
            Ok(self.engine.delete(&self.collection, ids).await?)
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.engine.delete_collection(&self.collection).await?;
            self.engine
                .ensure_collection(&self.collection, self.dimension)
                .await?;
            tracing::info!(backend = BACKEND, collection = %self.collection, "collection cleared");
            Ok(())
        })
    }

    fn stats(&self) -> BoxFuture<'_, Result<StoreStats>> {
        Box::pin(async move {
            let count = match self.engine.count(&self.collection).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(backend = BACKEND, error = %e, "count unavailable, enumerating ids");
                    self.engine.list_ids(&self.collection).await?.len()
                }
            };
            Ok(StoreStats {
                backend: BACKEND,
                count,
                dimension: Some(self.dimension),
                location: self.collection.clone(),
            })
        })
    }

    fn persist(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Err(e) = self.engine.flush(&self.collection).await {
                tracing::warn!(backend = BACKEND, error = %e, "collection flush failed");
            }
            Ok(())
        })
    }
}
