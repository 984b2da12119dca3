use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{DocumentError, SourceDocument, TextSplitter, normalize_text};
use crate::embedding::{Embedder, embed_texts};
use crate::types::{Chunk, EmbeddedChunk};
use crate::vector_store::VectorStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Chunks per store upsert.
    pub batch_size: usize,
    /// Texts per embedder call.
    pub embed_batch_size: usize,
    /// Documents with fewer words, before or after normalization, are skipped.
    pub min_words: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            embed_batch_size: 32,
            min_words: 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents_seen: usize,
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub chunks_created: usize,
    pub chunks_inserted: usize,
    pub fallback_embeddings: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

pub struct IngestionPipeline {
    splitter: TextSplitter,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    config: IngestConfig,
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("splitter", &self.splitter)
            .field("backend", &self.store.backend())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IngestionPipeline {
    pub fn new(
        splitter: TextSplitter,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: IngestConfig,
    ) -> Self {
        Self {
            splitter,
            store,
            embedder,
            config,
        }
    }

    /// Normalize, chunk and enrich one document. `None` if it is too short to index.
    fn prepare(&self, doc: &SourceDocument) -> Option<Vec<Chunk>> {
        if doc.word_count() < self.config.min_words {
            tracing::debug!(source_id = %doc.source_id, "skipping document: too short");
            return None;
        }
        let cleaned = normalize_text(&doc.text);
        if cleaned.split_whitespace().count() < self.config.min_words {
            tracing::debug!(source_id = %doc.source_id, "skipping document: too short after cleaning");
            return None;
        }
        let mut chunks = self.splitter.split(&cleaned);
        if chunks.is_empty() {
            return None;
        }
        for chunk in &mut chunks {
            doc.enrich(chunk);
        }
        Some(chunks)
    }

    /// Normalize -> chunk -> embed -> upsert -> persist.
    ///
    /// A failed upsert batch is recorded in the report and the remaining batches still
    /// run. Persist failures are logged only.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedder returns vectors of the wrong dimension.
    pub async fn ingest(&self, documents: &[SourceDocument]) -> Result<IngestReport, DocumentError> {
        let started = Instant::now();
        let mut report = IngestReport {
            documents_seen: documents.len(),
            ..IngestReport::default()
        };

        let mut chunks = Vec::new();
        for doc in documents {
            match self.prepare(doc) {
                Some(prepared) => {
                    chunks.extend(prepared);
                    report.documents_processed += 1;
                }
                None => report.documents_skipped += 1,
            }
        }
        report.chunks_created = chunks.len();

        if chunks.is_empty() {
            tracing::warn!(documents = documents.len(), "no chunks created, nothing to ingest");
            report.duration_ms = elapsed_ms(started);
            return Ok(report);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings =
            embed_texts(self.embedder.as_ref(), &texts, self.config.embed_batch_size).await?;
        report.fallback_embeddings = embeddings.iter().filter(|e| e.is_fallback()).count();

        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| EmbeddedChunk::new(chunk, embedding))
            .collect();

        for (batch_idx, batch) in embedded.chunks(self.config.batch_size.max(1)).enumerate() {
            match self.store.upsert(batch.to_vec()).await {
                Ok(inserted) => report.chunks_inserted += inserted,
                Err(e) => {
                    tracing::error!(batch = batch_idx, size = batch.len(), error = %e, "upsert batch failed");
                    report.errors.push(format!("batch {batch_idx}: {e}"));
                }
            }
        }

        if let Err(e) = self.store.persist().await {
            tracing::warn!(backend = self.store.backend(), error = %e, "persist after ingest failed");
        }

        report.duration_ms = elapsed_ms(started);
        tracing::info!(
            backend = self.store.backend(),
            documents = report.documents_seen,
            processed = report.documents_processed,
            chunks = report.chunks_created,
            inserted = report.chunks_inserted,
            fallbacks = report.fallback_embeddings,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "ingestion complete"
        );
        Ok(report)
    }

    /// Clear the store, then ingest `documents` from scratch. A failed clear is logged
    /// and ingestion proceeds.
    ///
    /// # Errors
    ///
    /// Same as [`IngestionPipeline::ingest`].
    pub async fn rebuild(&self, documents: &[SourceDocument]) -> Result<IngestReport, DocumentError> {
        tracing::info!(backend = self.store.backend(), "rebuilding index");
        if let Err(e) = self.store.clear().await {
            tracing::error!(backend = self.store.backend(), error = %e, "clear before rebuild failed");
        }
        self.ingest(documents).await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
