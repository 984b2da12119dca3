//! Boundary to the embedding model, plus batch embedding with hash-derived fallbacks.

use crate::types::Embedding;
use crate::vector_store::BoxFuture;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding provider failed.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// The provider returned a vector of the wrong length.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

/// External embedding model.
///
/// `embed` should return one vector per input text, in input order, each of length
/// [`Embedder::dimension`].
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>, EmbedError>>;
}

/// Deterministic, unit-length, clearly non-semantic vector derived from `text`.
#[must_use]
pub fn fallback_vector(text: &str, dimension: usize) -> Vec<f32> {
    if dimension == 0 {
        return Vec::new();
    }
    let mut hasher = blake3::Hasher::new();
    hasher.update(text.as_bytes());
    let mut reader = hasher.finalize_xof();
    let mut bytes = vec![0u8; dimension * 4];
    reader.fill(&mut bytes);

    #[expect(clippy::cast_precision_loss)]
    let mut vector: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| {
            let raw = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            (raw as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect();

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Embed `texts` in batches of `batch_size`.
///
/// A failed batch, or a batch that comes back short, degrades to fallback vectors for
/// the affected texts instead of aborting. Output has the same length and order as
/// `texts`.
///
/// # Errors
///
/// Returns [`EmbedError::Dimension`] if the provider returns a vector whose length
/// differs from [`Embedder::dimension`].
pub async fn embed_texts(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Embedding>, EmbedError> {
    let dimension = embedder.dimension();
    let mut out = Vec::with_capacity(texts.len());

    for (batch_idx, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        match embedder.embed(batch).await {
            Ok(vectors) => {
                if vectors.len() != batch.len() {
                    tracing::warn!(
                        batch = batch_idx,
                        expected = batch.len(),
                        received = vectors.len(),
                        "embedding count mismatch, padding with fallback vectors"
                    );
                }
                let mut vectors = vectors.into_iter();
                for text in batch {
                    match vectors.next() {
                        Some(v) if v.len() == dimension => out.push(Embedding::Real(v)),
                        Some(v) => {
                            return Err(EmbedError::Dimension {
                                expected: dimension,
                                actual: v.len(),
                            });
                        }
                        None => out.push(Embedding::Fallback(fallback_vector(text, dimension))),
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    batch = batch_idx,
                    size = batch.len(),
                    error = %e,
                    "embedding batch failed, using fallback vectors"
                );
                out.extend(
                    batch
                        .iter()
                        .map(|t| Embedding::Fallback(fallback_vector(t, dimension))),
                );
            }
        }
    }

    Ok(out)
}
