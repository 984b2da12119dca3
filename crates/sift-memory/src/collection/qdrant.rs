//! Qdrant-backed collection engine.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CollectionInfo, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    GetPointsBuilder, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder, vectors_config,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::engine::{CollectionEngine, EngineHit, EngineRecord, EngineResult};
use crate::error::EngineError;
use crate::types::{ChunkId, Metadata};
use crate::vector_store::BoxFuture;

/// Namespace for deriving Qdrant point ids from chunk ids.
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x5f1c_7a3e_92d4_4b1a_8e6f_0c2d_9b3a_41e7);

const SCROLL_PAGE: u32 = 256;

#[derive(Clone)]
pub struct QdrantEngine {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantEngine").finish_non_exhaustive()
    }
}

impl QdrantEngine {
    /// Create a client for the Qdrant gRPC endpoint at `url`.
    ///
    /// No connection is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built from `url`.
    pub fn new(url: &str) -> EngineResult<Self> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self { client })
    }

    /// Deterministic Qdrant point id for a chunk id.
    #[must_use]
    pub fn point_id(id: &ChunkId) -> String {
        Uuid::new_v5(&POINT_NAMESPACE, id.as_str().as_bytes()).to_string()
    }

    async fn existing(&self, collection: &str, ids: &[ChunkId]) -> EngineResult<Vec<ChunkId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let point_ids: Vec<PointId> = ids.iter().map(|id| Self::point_id(id).into()).collect();
        let response = self
            .client
            .get_points(GetPointsBuilder::new(collection, point_ids).with_payload(true))
            .await
            .map_err(Box::new)?;
        Ok(response
            .result
            .into_iter()
            .filter_map(|p| split_payload(p.payload).map(|(id, _, _)| id))
            .collect())
    }

    async fn scroll_ids(&self, collection: &str) -> EngineResult<Vec<ChunkId>> {
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .with_payload(true)
                .with_vectors(false)
                .limit(SCROLL_PAGE);
            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let response = self.client.scroll(builder).await.map_err(Box::new)?;
            ids.extend(
                response
                    .result
                    .into_iter()
                    .filter_map(|p| split_payload(p.payload).map(|(id, _, _)| id)),
            );

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(ids)
    }
}

/// Payload layout written for every point.
#[derive(Serialize)]
struct PayloadRef<'a> {
    chunk_id: &'a str,
    text: &'a str,
    metadata: &'a Metadata,
}

#[derive(Deserialize)]
struct StoredPayload {
    chunk_id: ChunkId,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

fn to_payload(record: &EngineRecord) -> EngineResult<HashMap<String, Value>> {
    let json = serde_json::to_value(PayloadRef {
        chunk_id: record.id.as_str(),
        text: &record.text,
        metadata: &record.metadata,
    })?;
    Ok(serde_json::from_value(json)?)
}

/// Pull `(chunk_id, text, metadata)` back out of a stored payload.
fn split_payload(payload: HashMap<String, Value>) -> Option<(ChunkId, String, Metadata)> {
    let json = serde_json::Value::Object(
        payload
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::from(v)))
            .collect(),
    );
    let stored: StoredPayload = serde_json::from_value(json).ok()?;
    Some((stored.chunk_id, stored.text, stored.metadata))
}

/// Vector size of a single-vector collection; `None` for named vectors or missing config.
fn vector_size(info: Option<CollectionInfo>) -> Option<u64> {
    let config = info?.config?.params?.vectors_config?.config?;
    match config {
        vectors_config::Config::Params(params) => Some(params.size),
        vectors_config::Config::ParamsMap(_) => None,
    }
}

impl CollectionEngine for QdrantEngine {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
    ) -> BoxFuture<'_, EngineResult<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if self
                .client
                .collection_exists(&collection)
                .await
                .map_err(Box::new)?
            {
                let info = self
                    .client
                    .collection_info(&collection)
                    .await
                    .map_err(Box::new)?;
                return match vector_size(info.result) {
                    Some(size) if size != dimension as u64 => {
                        Err(EngineError::DimensionMismatch {
                            expected: usize::try_from(size)
                                .map_err(|e| EngineError::Other(e.to_string()))?,
                            actual: dimension,
                        })
                    }
                    _ => Ok(()),
                };
            }
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&collection)
                        .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
                )
                .await
                .map_err(Box::new)?;
            tracing::info!(collection = %collection, dimension, "qdrant collection created");
            Ok(())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, EngineResult<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if self
                .client
                .collection_exists(&collection)
                .await
                .map_err(Box::new)?
            {
                self.client
                    .delete_collection(&collection)
                    .await
                    .map_err(Box::new)?;
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
            if records.is_empty() {
                return Ok(());
            }
            let ids: Vec<ChunkId> = records.iter().map(|r| r.id.clone()).collect();
            let existing = self.existing(&collection, &ids).await?;
            if !existing.is_empty() {
                return Err(EngineError::DuplicateIds(
                    existing.into_iter().map(|id| id.0).collect(),
                ));
            }

            let points = records
                .iter()
                .map(|r| {
                    Ok(PointStruct::new(
                        Self::point_id(&r.id),
                        r.vector.clone(),
                        to_payload(r)?,
                    ))
                })
                .collect::<EngineResult<Vec<_>>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, points).wait(true))
                .await
                .map_err(Box::new)?;
            Ok(())
        })
    }

    fn delete(&self, collection: &str, ids: Vec<ChunkId>) -> BoxFuture<'_, EngineResult<usize>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let existing = self.existing(&collection, &ids).await?;
            if existing.is_empty() {
                return Ok(0);
            }
            let point_ids: Vec<PointId> =
                existing.iter().map(|id| Self::point_id(id).into()).collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(PointsIdsList { ids: point_ids })
                        .wait(true),
                )
                .await
                .map_err(Box::new)?;
            Ok(existing.len())
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
            let response = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&collection, vector, limit as u64).with_payload(true),
                )
                .await
                .map_err(Box::new)?;
            // Cosine score is in [-1, 1]; report distance rescaled to [0, 1].
            Ok(response
                .result
                .into_iter()
                .filter_map(|p| {
                    let distance = ((1.0 - p.score) / 2.0).clamp(0.0, 1.0);
                    let (id, text, metadata) = split_payload(p.payload)?;
                    Some(EngineHit {
                        id,
                        distance,
                        text,
                        metadata,
                    })
                })
                .collect())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, EngineResult<usize>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let response = self
                .client
                .count(CountPointsBuilder::new(&collection).exact(true))
                .await
                .map_err(Box::new)?;
            let count = response.result.map_or(0, |r| r.count);
            usize::try_from(count).map_err(|e| EngineError::Other(e.to_string()))
        })
    }

    fn list_ids(&self, collection: &str) -> BoxFuture<'_, EngineResult<Vec<ChunkId>>> {
        let collection = collection.to_owned();
        Box::pin(async move { self.scroll_ids(&collection).await })
    }

    fn flush(&self, _collection: &str) -> BoxFuture<'_, EngineResult<()>> {
        // writes are issued with wait=true and are durable once acknowledged
        Box::pin(async { Ok(()) })
    }
}
