//! File-persisted flat backend.
//!
//! Live state is an immutable [`Snapshot`] behind an `Arc`. Rebuilds (upsert of stored
//! ids, delete) build the next snapshot in isolation and swap the pointer, so readers
//! never observe a partially rebuilt index. Plain appends go through `Arc::make_mut`
//! under the write lock: the snapshot is extended in place unless a reader still holds
//! it, in which case the append lands on a private copy. A writer mutex serializes
//! mutations.

mod index;

pub use index::{FlatIndex, euclidean_distance};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::types::{ChunkId, EmbeddedChunk, Metadata, ScoredChunk, StoreStats};
use crate::vector_store::{BoxFuture, VectorStore, validate_batch, validate_query};

/// Native index file name inside the store directory.
pub const INDEX_FILE: &str = "flat.index";
/// Side-table file name inside the store directory.
pub const META_FILE: &str = "flat_meta.json";

const BACKEND: &str = "flat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SlotEntry {
    chunk_id: ChunkId,
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

impl SlotEntry {
    fn from_doc(doc: &EmbeddedChunk) -> Self {
        Self {
            chunk_id: doc.chunk.id.clone(),
            text: doc.chunk.text.clone(),
            metadata: doc.stored_metadata(),
        }
    }
}

/// Side table as written to disk, keyed by slot number.
#[derive(Debug, Serialize, Deserialize)]
struct MetaFile {
    dimension: usize,
    index_checksum: String,
    entries: BTreeMap<usize, SlotEntry>,
}

impl MetaFile {
    fn matches(&self, index_bytes: &[u8]) -> bool {
        blake3::hash(index_bytes).to_hex().as_str() == self.index_checksum
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    index: FlatIndex,
    slots: Vec<SlotEntry>,
    by_id: HashMap<ChunkId, usize>,
}

impl Snapshot {
    fn empty(dimension: usize) -> Self {
        Self {
            index: FlatIndex::new(dimension),
            slots: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    fn from_parts(index: FlatIndex, slots: Vec<SlotEntry>) -> Result<Self> {
        if index.len() != slots.len() {
            return Err(StoreError::Consistency(format!(
                "index holds {} vectors but side table holds {} entries",
                index.len(),
                slots.len()
            )));
        }
        let mut by_id = HashMap::with_capacity(slots.len());
        for (slot, entry) in slots.iter().enumerate() {
            if by_id.insert(entry.chunk_id.clone(), slot).is_some() {
                return Err(StoreError::Consistency(format!(
                    "chunk {} occupies more than one slot",
                    entry.chunk_id
                )));
            }
        }
        Ok(Self {
            index,
            slots,
            by_id,
        })
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    /// Append ids that are not stored yet. The batch is validated beforehand.
    fn append(&mut self, docs: &[EmbeddedChunk]) {
        self.slots.reserve(docs.len());
        for doc in docs {
            let slot = self.index.push(doc.embedding.vector());
            self.slots.push(SlotEntry::from_doc(doc));
            self.by_id.insert(doc.chunk.id.clone(), slot);
        }
    }

    /// Build the successor snapshot: drop `removed`, substitute vectors for ids in
    /// `docs` that already exist, re-read every other vector from the native index in
    /// slot order, and append ids that are new.
    fn successor(&self, docs: &[EmbeddedChunk], removed: &HashSet<ChunkId>) -> Result<Self> {
        let replacements: HashMap<&ChunkId, &EmbeddedChunk> = docs
            .iter()
            .filter(|d| self.by_id.contains_key(&d.chunk.id))
            .map(|d| (&d.chunk.id, d))
            .collect();

        let capacity = self.len() + docs.len();
        let mut index = FlatIndex::with_capacity(self.index.dimension(), capacity);
        let mut slots = Vec::with_capacity(capacity);

        for (slot, entry) in self.slots.iter().enumerate() {
            if removed.contains(&entry.chunk_id) {
                continue;
            }
            if let Some(doc) = replacements.get(&entry.chunk_id) {
                index.push(doc.embedding.vector());
                slots.push(SlotEntry::from_doc(doc));
                continue;
            }
            let vector = self.index.reconstruct(slot).ok_or_else(|| {
                StoreError::Consistency(format!(
                    "vector for chunk {} (slot {slot}) cannot be recovered",
                    entry.chunk_id
                ))
            })?;
            index.push(vector);
            slots.push(entry.clone());
        }

        for doc in docs.iter().filter(|d| !self.by_id.contains_key(&d.chunk.id)) {
            index.push(doc.embedding.vector());
            slots.push(SlotEntry::from_doc(doc));
        }

        Self::from_parts(index, slots)
    }
}

/// Single dense index plus a slot-keyed side table, persisted as a file pair.
pub struct FlatIndexStore {
    dir: PathBuf,
    dimension: usize,
    live: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for FlatIndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatIndexStore")
            .field("dir", &self.dir)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl FlatIndexStore {
    /// Open the store rooted at `dir` for vectors of `dimension` components, loading a
    /// previously persisted file pair if present.
    ///
    /// A persist interrupted between its two renames is rolled forward when the staged
    /// side table matches the index on disk; unmatched staged files are discarded.
    /// The directory is created lazily on the first [`VectorStore::persist`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `dimension` is zero and
    /// [`StoreError::DimensionMismatch`] if the persisted index has another dimension.
    /// Returns [`StoreError::Consistency`] if only one of the two files exists, the
    /// index does not match the checksum recorded in the side table, or slot numbering
    /// is broken. Returns [`StoreError::Io`] if `dir` is not a directory or cannot be read.
    pub fn open(dir: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(StoreError::Validation(
                "flat index dimension must be positive".into(),
            ));
        }
        let dir = dir.into();
        let snapshot = load_snapshot(&dir, dimension)?;
        tracing::info!(
            backend = BACKEND,
            entries = snapshot.len(),
            dimension,
            dir = %dir.display(),
            "flat index opened"
        );
        Ok(Self {
            dir,
            dimension,
            live: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn current(&self) -> Result<Arc<Snapshot>> {
        self.live
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn swap(&self, next: Snapshot) -> Result<()> {
        let mut guard = self
            .live
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        *guard = Arc::new(next);
        Ok(())
    }

    fn append(&self, docs: &[EmbeddedChunk]) -> Result<usize> {
        let mut guard = self
            .live
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        let snap = Arc::make_mut(&mut *guard);
        snap.append(docs);
        Ok(snap.len())
    }

    async fn insert(&self, docs: Vec<EmbeddedChunk>, replace_existing: bool) -> Result<usize> {
        let _writer = self.writer.lock().await;
        validate_batch(&docs, Some(self.dimension))?;
        if docs.is_empty() {
            return Ok(0);
        }

        let snap = self.current()?;
        let taken: Vec<&str> = docs
            .iter()
            .filter(|d| snap.by_id.contains_key(&d.chunk.id))
            .map(|d| d.chunk.id.as_str())
            .collect();
        let replaced = taken.len();
        if replaced > 0 && !replace_existing {
            return Err(StoreError::Validation(format!(
                "ids already stored, use upsert: {}",
                taken.join(", ")
            )));
        }

        if replaced == 0 {
            drop(snap);
            let entries = self.append(&docs)?;
            tracing::debug!(
                backend = BACKEND,
                appended = docs.len(),
                entries,
                "flat index extended"
            );
            return Ok(docs.len());
        }

        let next = snap.successor(&docs, &HashSet::new())?;
        let entries = next.len();
        self.swap(next)?;
        tracing::info!(
            backend = BACKEND,
            replaced,
            appended = docs.len() - replaced,
            entries,
            "flat index rebuilt"
        );
        Ok(docs.len())
    }
}

impl VectorStore for FlatIndexStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn add(&self, docs: Vec<EmbeddedChunk>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(self.insert(docs, false))
    }

    fn upsert(&self, docs: Vec<EmbeddedChunk>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(self.insert(docs, true))
    }

    fn search(&self, query: Vec<f32>, top_k: usize) -> BoxFuture<'_, Result<Vec<ScoredChunk>>> {
        Box::pin(async move {
            validate_query(&query, self.dimension)?;
            let snap = self.current()?;

            snap.index
                .search(&query, top_k)
                .into_iter()
                .map(|(slot, distance)| {
                    let entry = snap.slots.get(slot).ok_or_else(|| {
                        StoreError::Consistency(format!("slot {slot} has no side-table entry"))
                    })?;
                    Ok(ScoredChunk {
                        id: entry.chunk_id.clone(),
                        score: 1.0 / (1.0 + distance),
                        text: entry.text.clone(),
                        metadata: entry.metadata.clone(),
                    })
                })
                .collect()
        })
    }

    fn delete(&self, ids: Vec<ChunkId>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let _writer = self.writer.lock().await;
            let snap = self.current()?;

            let removed: HashSet<ChunkId> = ids
                .into_iter()
                .filter(|id| snap.by_id.contains_key(id))
                .collect();
            if removed.is_empty() {
                return Ok(0);
            }

            let next = snap.successor(&[], &removed)?;
            let entries = next.len();
            self.swap(next)?;
            tracing::info!(
                backend = BACKEND,
                removed = removed.len(),
                entries,
                "flat index rebuilt"
            );
            Ok(removed.len())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _writer = self.writer.lock().await;
            self.swap(Snapshot::empty(self.dimension))?;
            remove_files(&self.dir)?;
            tracing::info!(backend = BACKEND, dir = %self.dir.display(), "flat index cleared");
            Ok(())
        })
    }

    fn stats(&self) -> BoxFuture<'_, Result<StoreStats>> {
        Box::pin(async move {
            let snap = self.current()?;
            Ok(StoreStats {
                backend: BACKEND,
                count: snap.len(),
                dimension: Some(self.dimension),
                location: self.dir.display().to_string(),
            })
        })
    }

    fn persist(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _writer = self.writer.lock().await;
            let snap = self.current()?;
            write_snapshot(&self.dir, &snap)?;
            tracing::debug!(backend = BACKEND, entries = snap.len(), "flat index persisted");
            Ok(())
        })
    }
}

fn staged_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.tmp"))
}

/// Finish a persist that stopped after staging its files, or discard what it left.
fn recover_staged(dir: &Path) -> Result<()> {
    let index_tmp = staged_path(dir, INDEX_FILE);
    let meta_tmp = staged_path(dir, META_FILE);
    let staged_meta = match fs::read(&meta_tmp) {
        Ok(bytes) => serde_json::from_slice::<MetaFile>(&bytes).ok(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let staged_matches = |path: &Path| {
        staged_meta
            .as_ref()
            .is_some_and(|meta| fs::read(path).is_ok_and(|bytes| meta.matches(&bytes)))
    };

    if index_tmp.exists() {
        if staged_matches(&index_tmp) {
            fs::rename(&index_tmp, dir.join(INDEX_FILE))?;
            fs::rename(&meta_tmp, dir.join(META_FILE))?;
            tracing::warn!(backend = BACKEND, dir = %dir.display(), "completed interrupted persist");
            return Ok(());
        }
    } else if staged_matches(&dir.join(INDEX_FILE)) {
        fs::rename(&meta_tmp, dir.join(META_FILE))?;
        tracing::warn!(backend = BACKEND, dir = %dir.display(), "completed interrupted persist");
        return Ok(());
    }

    for path in [index_tmp, meta_tmp] {
        if remove_if_exists(&path)? {
            tracing::warn!(backend = BACKEND, path = %path.display(), "discarded staged file");
        }
    }
    Ok(())
}

fn load_snapshot(dir: &Path, dimension: usize) -> Result<Snapshot> {
    if dir.exists() && !dir.is_dir() {
        return Err(StoreError::Io(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{} is not a directory", dir.display()),
        )));
    }
    recover_staged(dir)?;

    let index_path = dir.join(INDEX_FILE);
    let meta_path = dir.join(META_FILE);
    match (index_path.exists(), meta_path.exists()) {
        (false, false) => Ok(Snapshot::empty(dimension)),
        (true, false) => Err(StoreError::Consistency(format!(
            "{INDEX_FILE} present without {META_FILE}"
        ))),
        (false, true) => Err(StoreError::Consistency(format!(
            "{META_FILE} present without {INDEX_FILE}"
        ))),
        (true, true) => {
            let bytes = fs::read(&index_path)?;
            let meta: MetaFile = serde_json::from_slice(&fs::read(&meta_path)?)?;

            if !meta.matches(&bytes) {
                return Err(StoreError::Consistency(
                    "index file does not match the checksum recorded in the side table".into(),
                ));
            }
            let index = FlatIndex::read_from(bytes.as_slice())
                .map_err(|e| StoreError::Consistency(format!("unreadable index file: {e}")))?;
            if index.dimension() != meta.dimension {
                return Err(StoreError::Consistency(format!(
                    "side table records dimension {} but index has {}",
                    meta.dimension,
                    index.dimension()
                )));
            }
            if index.dimension() != dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: dimension,
                    actual: index.dimension(),
                });
            }

            let mut slots = Vec::with_capacity(meta.entries.len());
            for (expected, (slot, entry)) in meta.entries.into_iter().enumerate() {
                if slot != expected {
                    return Err(StoreError::Consistency(format!(
                        "side table has no entry for slot {expected}"
                    )));
                }
                slots.push(entry);
            }
            Snapshot::from_parts(index, slots)
        }
    }
}

/// Write both files to temporaries, sync, then rename into place.
fn write_snapshot(dir: &Path, snap: &Snapshot) -> Result<()> {
    if snap.slots.is_empty() {
        return remove_files(dir);
    }
    fs::create_dir_all(dir)?;
    let index = &snap.index;

    let mut index_bytes = Vec::with_capacity(24 + index.len() * index.dimension() * 4);
    index.write_to(&mut index_bytes)?;
    let meta = MetaFile {
        dimension: index.dimension(),
        index_checksum: blake3::hash(&index_bytes).to_hex().to_string(),
        entries: snap.slots.iter().cloned().enumerate().collect(),
    };
    let meta_bytes = serde_json::to_vec_pretty(&meta)?;

    let index_tmp = staged_path(dir, INDEX_FILE);
    let meta_tmp = staged_path(dir, META_FILE);

    let staged = write_synced(&index_tmp, &index_bytes)
        .and_then(|()| write_synced(&meta_tmp, &meta_bytes))
        .and_then(|()| fs::rename(&index_tmp, dir.join(INDEX_FILE)))
        .and_then(|()| fs::rename(&meta_tmp, dir.join(META_FILE)));
    if let Err(e) = staged {
        let _ = fs::remove_file(&index_tmp);
        let _ = fs::remove_file(&meta_tmp);
        return Err(e.into());
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// `Ok(true)` if the file existed and was removed.
fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn remove_files(dir: &Path) -> Result<()> {
    for name in [INDEX_FILE, META_FILE] {
        remove_if_exists(&dir.join(name))?;
    }
    Ok(())
}
