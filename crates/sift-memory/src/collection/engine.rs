use crate::error::EngineError;
use crate::types::{ChunkId, Metadata};
use crate::vector_store::BoxFuture;

pub type EngineResult<T> = Result<T, EngineError>;

/// A record as handed to a collection engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRecord {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// A native query hit. `distance` is engine-defined and non-negative; smaller is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineHit {
    pub id: ChunkId,
    pub distance: f32,
    pub text: String,
    pub metadata: Metadata,
}

/// Primitives a collection engine offers natively: id-addressed writes and deletes,
/// and queries that report a distance with each hit.
pub trait CollectionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create `collection` if absent. Idempotent.
    fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
    ) -> BoxFuture<'_, EngineResult<()>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, EngineResult<()>>;

    /// Insert records. Fails with [`EngineError::DuplicateIds`] and writes nothing if
    /// any id already exists.
    fn add(&self, collection: &str, records: Vec<EngineRecord>)
    -> BoxFuture<'_, EngineResult<()>>;

    /// Remove records by id, returning how many existed.
    fn delete(&self, collection: &str, ids: Vec<ChunkId>) -> BoxFuture<'_, EngineResult<usize>>;

    fn query(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> BoxFuture<'_, EngineResult<Vec<EngineHit>>>;

    /// Native entry count. May fail with [`EngineError::Unsupported`].
    fn count(&self, collection: &str) -> BoxFuture<'_, EngineResult<usize>>;

    fn list_ids(&self, collection: &str) -> BoxFuture<'_, EngineResult<Vec<ChunkId>>>;

    /// Make buffered writes durable.
    fn flush(&self, collection: &str) -> BoxFuture<'_, EngineResult<()>>;
}
