use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use crate::error::{Result, StoreError};
use crate::types::{ChunkId, EmbeddedChunk, ScoredChunk, StoreStats};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operation contract shared by every backend.
///
/// Implementations assume a single mutating caller at a time; searches may run
/// concurrently with mutations and always observe a complete snapshot.
pub trait VectorStore: Send + Sync {
    /// Short backend name used in stats and logs.
    fn backend(&self) -> &'static str;

    /// Insert new entries. Returns the number inserted.
    fn add(&self, docs: Vec<EmbeddedChunk>) -> BoxFuture<'_, Result<usize>>;

    /// Insert or replace entries by id. Returns the number written.
    fn upsert(&self, docs: Vec<EmbeddedChunk>) -> BoxFuture<'_, Result<usize>>;

    /// Nearest neighbours of `query`, best first.
    fn search(&self, query: Vec<f32>, top_k: usize) -> BoxFuture<'_, Result<Vec<ScoredChunk>>>;

    /// Remove entries by id. Returns the number actually removed.
    fn delete(&self, ids: Vec<ChunkId>) -> BoxFuture<'_, Result<usize>>;

    /// Drop every entry. Safe to call repeatedly.
    fn clear(&self) -> BoxFuture<'_, Result<()>>;

    fn stats(&self) -> BoxFuture<'_, Result<StoreStats>>;

    /// Write state to durable storage.
    fn persist(&self) -> BoxFuture<'_, Result<()>>;
}

/// Check a batch before it touches any backend state.
///
/// Returns the dimension shared by the batch (or `expected` for an empty batch).
///
/// # Errors
///
/// Returns [`StoreError::Validation`] for empty ids, empty text, duplicate ids,
/// empty or non-finite vectors, and [`StoreError::DimensionMismatch`] when a vector
/// length differs from `expected` or from the rest of the batch.
pub fn validate_batch(docs: &[EmbeddedChunk], expected: Option<usize>) -> Result<Option<usize>> {
    let mut dimension = expected;
    let mut seen = HashSet::with_capacity(docs.len());

    for doc in docs {
        let id = &doc.chunk.id;
        if id.as_str().trim().is_empty() {
            return Err(StoreError::Validation("chunk id must not be empty".into()));
        }
        if doc.chunk.text.trim().is_empty() {
            return Err(StoreError::Validation(format!("chunk {id} has empty text")));
        }
        if !seen.insert(id) {
            return Err(StoreError::Validation(format!(
                "chunk {id} appears more than once in the batch"
            )));
        }

        let vector = doc.embedding.vector();
        if vector.is_empty() {
            return Err(StoreError::Validation(format!("chunk {id} has an empty vector")));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::Validation(format!(
                "chunk {id} has non-finite vector components"
            )));
        }
        match dimension {
            Some(expected) if expected != vector.len() => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => dimension = Some(vector.len()),
        }
    }

    Ok(dimension)
}

/// Check a query vector against the store dimension.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] for an empty or non-finite query and
/// [`StoreError::DimensionMismatch`] when its length differs from `dimension`.
pub fn validate_query(query: &[f32], dimension: usize) -> Result<()> {
    if query.is_empty() {
        return Err(StoreError::Validation("query vector is empty".into()));
    }
    if query.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::Validation(
            "query vector has non-finite components".into(),
        ));
    }
    if query.len() != dimension {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: query.len(),
        });
    }
    Ok(())
}
