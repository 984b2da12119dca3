use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ScoredChunk, StoreStats};
use crate::vector_store::VectorStore;

const FALLBACK_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Results scoring below this are discarded.
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: FALLBACK_TOP_K,
            min_similarity: 0.0,
        }
    }
}

/// Ranked search over a [`VectorStore`] with a similarity floor.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("backend", &self.store.backend())
            .field("config", &self.config)
            .finish()
    }
}

impl Retriever {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Top matches for `query`, best first.
    ///
    /// An empty query yields no results. A missing or zero `top_k` falls back to the
    /// configured default; `min_similarity` likewise. Ties keep backend order.
    ///
    /// # Errors
    ///
    /// Propagates backend errors, including dimension mismatches.
    pub async fn search(
        &self,
        query: &[f32],
        top_k: Option<usize>,
        min_similarity: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let top_k = match top_k {
            Some(k) if k > 0 => k,
            _ if self.config.top_k > 0 => self.config.top_k,
            _ => FALLBACK_TOP_K,
        };
        let floor = min_similarity
            .filter(|f| f.is_finite())
            .unwrap_or(self.config.min_similarity);

        let mut hits = self.store.search(query.to_vec(), top_k).await?;
        hits.retain(|h| h.score >= floor);
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(
            backend = self.store.backend(),
            top_k,
            floor,
            results = hits.len(),
            "retrieval complete"
        );
        Ok(hits)
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }
}
