//! Test-only deterministic embedder.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embedding::{EmbedError, Embedder};
use crate::vector_store::BoxFuture;

/// Hashed bag-of-words embedder: texts sharing words get similar vectors.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
    output_dimension: usize,
    fail: bool,
    drop_last: usize,
    calls: Arc<AtomicUsize>,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            output_dimension: dimension,
            fail: false,
            drop_last: 0,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every call returns an error.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Return `n` fewer vectors than requested per call.
    #[must_use]
    pub fn dropping_last(mut self, n: usize) -> Self {
        self.drop_last = n;
        self
    }

    /// Emit vectors of `dimension` while still advertising the configured one.
    #[must_use]
    pub fn with_output_dimension(mut self, dimension: usize) -> Self {
        self.output_dimension = dimension;
        self
    }

    /// Number of `embed` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        bag_of_words(text, self.output_dimension)
    }
}

#[expect(clippy::cast_possible_truncation)]
fn bag_of_words(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension];
    if dimension == 0 {
        return vector;
    }
    for word in text.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.is_empty() {
            continue;
        }
        let hash = blake3::hash(word.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        let bucket = (u64::from_le_bytes(head) % dimension as u64) as usize;
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        vector[0] = 1.0;
    } else {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

impl Embedder for MockEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>, EmbedError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(EmbedError::Provider("mock embed error".into()));
            }
            let keep = texts.len().saturating_sub(self.drop_last);
            Ok(texts[..keep].iter().map(|t| self.vector_for(t)).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_words_score_closer() {
        let embedder = MockEmbedder::new(64);
        let a = embedder.vector_for("rust borrow checker");
        let b = embedder.vector_for("the borrow checker in rust");
        let c = embedder.vector_for("banana bread recipe");
        let dot = |x: &[f32], y: &[f32]| x.iter().zip(y).map(|(p, q)| p * q).sum::<f32>();
        assert!(dot(&a, &b) > dot(&a, &c));
    }

    #[test]
    fn blank_text_still_yields_unit_vector() {
        let v = MockEmbedder::new(4).vector_for("   ");
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn counts_calls() {
        let embedder = MockEmbedder::new(4);
        let texts = vec!["a".to_owned()];
        embedder.embed(&texts).await.unwrap();
        embedder.embed(&texts).await.unwrap();
        assert_eq!(embedder.calls(), 2);
    }
}
