use std::str::FromStr;

use super::Config;

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(parsed) = v.trim().parse::<T>() {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(dimension) = parsed("SIFT_EMBEDDING_DIMENSION") {
            self.embedding.dimension = dimension;
        }
        if let Some(size) = parsed("SIFT_EMBEDDING_BATCH_SIZE") {
            self.embedding.batch_size = size;
        }
        if let Some(size) = parsed("SIFT_CHUNK_SIZE") {
            self.chunking.target_size = size;
        }
        if let Some(overlap) = parsed("SIFT_CHUNK_OVERLAP") {
            self.chunking.overlap = overlap;
        }
        if let Some(backend) = parsed("SIFT_STORE_BACKEND") {
            self.store.backend = backend;
        }
        if let Ok(v) = std::env::var("SIFT_STORE_PATH") {
            self.store.path = v;
        }
        if let Ok(v) = std::env::var("SIFT_STORE_COLLECTION") {
            self.store.collection = v;
        }
        if let Some(engine) = parsed("SIFT_STORE_ENGINE") {
            self.store.engine = engine;
        }
        if let Ok(v) = std::env::var("SIFT_QDRANT_URL") {
            self.store.qdrant_url = v;
        }
        if let Some(top_k) = parsed("SIFT_RETRIEVAL_TOP_K") {
            self.retrieval.top_k = top_k;
        }
        if let Some(floor) = parsed::<f32>("SIFT_RETRIEVAL_MIN_SIMILARITY")
            && floor.is_finite()
        {
            self.retrieval.min_similarity = floor.clamp(0.0, 1.0);
        }
        if let Some(size) = parsed("SIFT_INGEST_BATCH_SIZE") {
            self.ingest.batch_size = size;
        }
        if let Some(min_words) = parsed("SIFT_INGEST_MIN_WORDS") {
            self.ingest.min_words = min_words;
        }
    }
}
