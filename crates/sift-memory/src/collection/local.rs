//! In-process collection engine, optionally persisted as one JSON file per collection.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::engine::{CollectionEngine, EngineHit, EngineRecord, EngineResult};
use crate::error::EngineError;
use crate::types::{ChunkId, Metadata};
use crate::vector_store::BoxFuture;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    vector: Vec<f32>,
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct LocalCollection {
    dimension: usize,
    records: BTreeMap<ChunkId, StoredRecord>,
}

pub struct LocalEngine {
    root: Option<PathBuf>,
    collections: RwLock<HashMap<String, LocalCollection>>,
}

impl LocalEngine {
    /// Engine with no durable storage; `flush` is a no-op.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            root: None,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Engine persisting each collection under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> EngineResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root: Some(root),
            collections: RwLock::new(HashMap::new()),
        })
    }

    fn collection_path(&self, collection: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{collection}.collection.json")))
    }
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn check_name(collection: &str) -> EngineResult<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(EngineError::Other(format!(
            "invalid collection name {collection:?}"
        )))
    }
}

fn lock_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Other(format!("collection lock poisoned: {e}"))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Cosine distance rescaled to `[0, 1]`.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    ((1.0 - cosine_similarity(a, b)) / 2.0).clamp(0.0, 1.0)
}

impl CollectionEngine for LocalEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
    ) -> BoxFuture<'_, EngineResult<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            check_name(&collection)?;
            let mut cols = self.collections.write().map_err(lock_err)?;
            if let Some(existing) = cols.get(&collection) {
                if existing.dimension != dimension {
                    return Err(EngineError::DimensionMismatch {
                        expected: existing.dimension,
                        actual: dimension,
                    });
                }
                return Ok(());
            }

            let loaded = match self.collection_path(&collection) {
                Some(path) if path.exists() => {
                    let stored: LocalCollection = serde_json::from_slice(&fs::read(&path)?)?;
                    if stored.dimension != dimension {
                        return Err(EngineError::DimensionMismatch {
                            expected: stored.dimension,
                            actual: dimension,
                        });
                    }
                    tracing::debug!(
                        collection = %collection,
                        records = stored.records.len(),
                        "local collection loaded"
                    );
                    stored
                }
                _ => LocalCollection {
                    dimension,
                    records: BTreeMap::new(),
                },
            };
            cols.insert(collection, loaded);
            Ok(())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, EngineResult<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(lock_err)?;
            cols.remove(&collection);
            if let Some(path) = self.collection_path(&collection) {
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
    }

    fn add(
        &self,
        collection: &str,
        records: Vec<EngineRecord>,
    ) -> BoxFuture<'_, EngineResult<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(lock_err)?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| EngineError::CollectionNotFound(collection.clone()))?;

            if let Some(bad) = records.iter().find(|r| r.vector.len() != col.dimension) {
                return Err(EngineError::DimensionMismatch {
                    expected: col.dimension,
                    actual: bad.vector.len(),
                });
            }
            let duplicates: Vec<String> = records
                .iter()
                .filter(|r| col.records.contains_key(&r.id))
                .map(|r| r.id.to_string())
                .collect();
            if !duplicates.is_empty() {
                return Err(EngineError::DuplicateIds(duplicates));
            }

            for r in records {
                col.records.insert(
                    r.id,
                    StoredRecord {
                        vector: r.vector,
                        text: r.text,
                        metadata: r.metadata,
                    },
                );
            }
            Ok(())
        })
    }

    fn delete(&self, collection: &str, ids: Vec<ChunkId>) -> BoxFuture<'_, EngineResult<usize>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(0);
            }
            let mut cols = self.collections.write().map_err(lock_err)?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| EngineError::CollectionNotFound(collection.clone()))?;
            Ok(ids
                .iter()
                .filter(|id| col.records.remove(*id).is_some())
                .count())
        })
    }

    fn query(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> BoxFuture<'_, EngineResult<Vec<EngineHit>>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(lock_err)?;
            let col = cols
                .get(&collection)
                .ok_or_else(|| EngineError::CollectionNotFound(collection.clone()))?;

            let mut hits: Vec<EngineHit> = col
                .records
                .iter()
                .map(|(id, r)| EngineHit {
                    id: id.clone(),
                    distance: cosine_distance(&vector, &r.vector),
                    text: r.text.clone(),
                    metadata: r.metadata.clone(),
                })
                .collect();
            hits.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            hits.truncate(limit);
            Ok(hits)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, EngineResult<usize>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(lock_err)?;
            cols.get(&collection)
                .map(|c| c.records.len())
                .ok_or(EngineError::CollectionNotFound(collection))
        })
    }

    fn list_ids(&self, collection: &str) -> BoxFuture<'_, EngineResult<Vec<ChunkId>>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(lock_err)?;
            cols.get(&collection)
                .map(|c| c.records.keys().cloned().collect())
                .ok_or(EngineError::CollectionNotFound(collection))
        })
    }

    fn flush(&self, collection: &str) -> BoxFuture<'_, EngineResult<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let Some(path) = self.collection_path(&collection) else {
                return Ok(());
            };
            let bytes = {
                let cols = self.collections.read().map_err(lock_err)?;
                let col = cols
                    .get(&collection)
                    .ok_or_else(|| EngineError::CollectionNotFound(collection.clone()))?;
                serde_json::to_vec(col)?
            };

            let tmp = path.with_extension("json.tmp");
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, vector: Vec<f32>) -> EngineRecord {
        EngineRecord {
            id: ChunkId::from(id),
            vector,
            text: format!("text {id}"),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let engine = LocalEngine::in_memory();
        engine.ensure_collection("posts", 3).await.unwrap();
        engine.ensure_collection("posts", 3).await.unwrap();
        assert_eq!(engine.count("posts").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ensure_collection_rejects_other_dimension() {
        let engine = LocalEngine::in_memory();
        engine.ensure_collection("posts", 3).await.unwrap();
        let err = engine.ensure_collection("posts", 4).await.unwrap_err();
        assert!(matches!(err, EngineError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn invalid_collection_name_rejected() {
        let engine = LocalEngine::in_memory();
        assert!(engine.ensure_collection("../escape", 3).await.is_err());
        assert!(engine.ensure_collection("", 3).await.is_err());
    }

    #[tokio::test]
    async fn add_rejects_duplicates_without_writing() {
        let engine = LocalEngine::in_memory();
        engine.ensure_collection("c", 2).await.unwrap();
        engine.add("c", vec![record("a", vec![1.0, 0.0])]).await.unwrap();

        let err = engine
            .add("c", vec![record("b", vec![0.0, 1.0]), record("a", vec![1.0, 1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateIds(ref ids) if ids == &["a".to_owned()]));
        assert_eq!(engine.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_reports_rescaled_cosine_distance() {
        let engine = LocalEngine::in_memory();
        engine.ensure_collection("c", 2).await.unwrap();
        engine
            .add(
                "c",
                vec![
                    record("same", vec![2.0, 0.0]),
                    record("orthogonal", vec![0.0, 1.0]),
                    record("opposite", vec![-1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = engine.query("c", vec![1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits[0].id.as_str(), "same");
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[1].distance - 0.5).abs() < 1e-6);
        assert!((hits[2].distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn delete_counts_existing_only() {
        let engine = LocalEngine::in_memory();
        engine.ensure_collection("c", 1).await.unwrap();
        engine.add("c", vec![record("a", vec![1.0])]).await.unwrap();
        let removed = engine
            .delete("c", vec![ChunkId::from("a"), ChunkId::from("zz")])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(engine.list_ids("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn operations_on_missing_collection_fail() {
        let engine = LocalEngine::in_memory();
        assert!(matches!(
            engine.count("nope").await,
            Err(EngineError::CollectionNotFound(_))
        ));
        assert!(engine.query("nope", vec![1.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn flush_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = LocalEngine::open(dir.path()).unwrap();
            engine.ensure_collection("c", 2).await.unwrap();
            engine.add("c", vec![record("a", vec![1.0, 0.0])]).await.unwrap();
            engine.flush("c").await.unwrap();
        }

        let engine = LocalEngine::open(dir.path()).unwrap();
        engine.ensure_collection("c", 2).await.unwrap();
        assert_eq!(
            engine.list_ids("c").await.unwrap(),
            vec![ChunkId::from("a")]
        );
    }

    #[tokio::test]
    async fn delete_collection_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LocalEngine::open(dir.path()).unwrap();
        engine.ensure_collection("c", 1).await.unwrap();
        engine.flush("c").await.unwrap();
        let path = dir.path().join("c.collection.json");
        assert!(path.exists());

        engine.delete_collection("c").await.unwrap();
        engine.delete_collection("c").await.unwrap();
        assert!(!path.exists());
    }
}
