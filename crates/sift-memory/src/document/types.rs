use serde::{Deserialize, Serialize};

use crate::types::{Chunk, MetaValue};

/// A source post before normalization and chunking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_id: String,
    #[serde(default)]
    pub topic_id: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub author: Option<String>,
    pub text: String,
}

impl SourceDocument {
    #[must_use]
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            topic_id: None,
            url: String::new(),
            title: String::new(),
            timestamp: String::new(),
            author: None,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Attach this document's provenance to `chunk`.
    pub fn enrich(&self, chunk: &mut Chunk) {
        let meta = &mut chunk.metadata;
        meta.insert("source_id".into(), MetaValue::from(self.source_id.as_str()));
        if let Some(topic_id) = &self.topic_id {
            meta.insert("topic_id".into(), MetaValue::from(topic_id.as_str()));
        }
        meta.insert("url".into(), MetaValue::from(self.url.as_str()));
        meta.insert("title".into(), MetaValue::from(self.title.as_str()));
        meta.insert("timestamp".into(), MetaValue::from(self.timestamp.as_str()));
        meta.insert(
            "author".into(),
            MetaValue::from(self.author.as_deref().unwrap_or_default()),
        );
        meta.insert(
            "chunk_index".into(),
            MetaValue::Integer(i64::try_from(chunk.index).unwrap_or(i64::MAX)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkId, Metadata};

    #[test]
    fn enrich_sets_provenance() {
        let doc = SourceDocument {
            topic_id: Some("7".into()),
            url: "https://forum.example/t/7/2".into(),
            title: "Deadline question".into(),
            timestamp: "2025-01-15T10:00:00Z".into(),
            author: Some("ta_bot".into()),
            ..SourceDocument::new("42", "body")
        };
        let mut chunk = Chunk {
            id: ChunkId::from("c"),
            text: "body".into(),
            index: 3,
            metadata: Metadata::new(),
        };
        doc.enrich(&mut chunk);
        let m = &chunk.metadata;
        assert_eq!(m["source_id"].as_str(), Some("42"));
        assert_eq!(m["topic_id"].as_str(), Some("7"));
        assert_eq!(m["url"].as_str(), Some("https://forum.example/t/7/2"));
        assert_eq!(m["author"].as_str(), Some("ta_bot"));
        assert_eq!(m["chunk_index"], MetaValue::Integer(3));
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let doc: SourceDocument =
            serde_json::from_str(r#"{"source_id":"1","text":"hello there"}"#).unwrap();
        assert_eq!(doc, SourceDocument::new("1", "hello there"));
        assert_eq!(doc.word_count(), 2);
    }

    #[test]
    fn missing_author_stored_as_empty() {
        let mut chunk = Chunk {
            id: ChunkId::from("c"),
            text: "t".into(),
            index: 0,
            metadata: Metadata::new(),
        };
        SourceDocument::new("1", "t").enrich(&mut chunk);
        assert_eq!(chunk.metadata["author"].as_str(), Some(""));
        assert!(!chunk.metadata.contains_key("topic_id"));
    }
}
