use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key set on stored entries whose vector is a hash-derived fallback.
pub const FALLBACK_FLAG: &str = "embedding_fallback";

/// Stable identifier of a chunk. Survives every rebuild; only its physical slot moves.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub String);

impl ChunkId {
    /// Fresh random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChunkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ChunkId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A single metadata value. Stored opaquely and returned unchanged at retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

pub type Metadata = BTreeMap<String, MetaValue>;

/// A bounded text passage produced by the splitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    /// Position within the source document, counted from 0 in emission order.
    pub index: usize,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A vector for a chunk, tagged by where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Embedding {
    /// Produced by the embedding model.
    Real(Vec<f32>),
    /// Hash-derived placeholder. Not semantically meaningful.
    Fallback(Vec<f32>),
}

impl Embedding {
    #[must_use]
    pub fn vector(&self) -> &[f32] {
        match self {
            Self::Real(v) | Self::Fallback(v) => v,
        }
    }

    #[must_use]
    pub fn into_vector(self) -> Vec<f32> {
        match self {
            Self::Real(v) | Self::Fallback(v) => v,
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vector().len()
    }
}

/// A chunk paired with its vector, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Embedding,
}

impl EmbeddedChunk {
    #[must_use]
    pub fn new(chunk: Chunk, embedding: Embedding) -> Self {
        Self { chunk, embedding }
    }

    /// Chunk metadata as it should be stored, with the fallback flag set when applicable.
    #[must_use]
    pub fn stored_metadata(&self) -> Metadata {
        let mut metadata = self.chunk.metadata.clone();
        if self.embedding.is_fallback() {
            metadata.insert(FALLBACK_FLAG.into(), MetaValue::Bool(true));
        }
        metadata
    }
}

/// A search hit with similarity score in `[0, 1]`, higher is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: ChunkId,
    pub score: f32,
    pub text: String,
    pub metadata: Metadata,
}

impl ScoredChunk {
    /// Whether the stored vector was a fallback rather than a model embedding.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.metadata
            .get(FALLBACK_FLAG)
            .and_then(MetaValue::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub backend: &'static str,
    pub count: usize,
    /// `None` until the first vector establishes it.
    pub dimension: Option<usize>,
    /// Directory or collection name backing the store.
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: ChunkId::from("c1"),
            text: text.into(),
            index: 0,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn chunk_id_display() {
        let id = ChunkId::from("abc");
        assert_eq!(format!("{id}"), "abc");
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(ChunkId::random(), ChunkId::random());
    }

    #[test]
    fn meta_value_untagged_json() {
        let mut meta = Metadata::new();
        meta.insert("url".into(), "https://x".into());
        meta.insert("topic_id".into(), 12_i64.into());
        meta.insert("score".into(), 0.5_f64.into());
        meta.insert("pinned".into(), true.into());

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"pinned": true, "score": 0.5, "topic_id": 12, "url": "https://x"})
        );
        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn fallback_embedding_is_flagged_in_stored_metadata() {
        let doc = EmbeddedChunk::new(chunk("hi there"), Embedding::Fallback(vec![0.0; 3]));
        let meta = doc.stored_metadata();
        assert_eq!(meta.get(FALLBACK_FLAG), Some(&MetaValue::Bool(true)));
    }

    #[test]
    fn real_embedding_leaves_metadata_untouched() {
        let doc = EmbeddedChunk::new(chunk("hi there"), Embedding::Real(vec![1.0, 0.0]));
        assert!(doc.stored_metadata().is_empty());
        assert_eq!(doc.embedding.dimension(), 2);
    }

    #[test]
    fn word_count_ignores_extra_whitespace() {
        assert_eq!(chunk("  a  b\tc\n").word_count(), 3);
    }
}
