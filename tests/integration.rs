use std::path::Path;
use std::sync::Arc;

use serial_test::serial;
use sift_core::{AppContext, Config};
use sift_memory::document::{SourceDocument, TextSplitter};
use sift_memory::mock::MockEmbedder;
use sift_memory::{
    BackendKind, Chunk, ChunkId, EmbeddedChunk, Embedding, FlatIndexStore, Metadata, StoreError,
    VectorStore, embedding,
};

const DIM: usize = 64;

// -- Helpers --

fn config_for(dir: &Path, backend: BackendKind) -> Config {
    let mut config = Config::default();
    config.embedding.dimension = DIM;
    config.embedding.batch_size = 4;
    config.chunking.target_size = 24;
    config.chunking.overlap = 4;
    config.store.backend = backend;
    config.store.path = dir.display().to_string();
    config.ingest.batch_size = 3;
    config
}

fn posts() -> Vec<SourceDocument> {
    vec![
        SourceDocument {
            url: "https://forum.example/t/deadlines/1".into(),
            title: "Deadlines".into(),
            timestamp: "2025-01-10T09:00:00Z".into(),
            author: Some("instructor".into()),
            ..SourceDocument::new(
                "101",
                "The first project is due on Sunday at midnight. Late submissions lose ten \
                 percent per day. Extensions are granted only for documented emergencies.\n\n\
                 Regards,\nCourse staff",
            )
        },
        SourceDocument {
            url: "https://forum.example/t/docker/2".into(),
            title: "Docker setup".into(),
            ..SourceDocument::new(
                "102",
                "Install Docker Desktop and enable the WSL backend on Windows. Pull the course \
                 image before the lab session. Run the container with the provided compose file \
                 and mount your project folder.",
            )
        },
        SourceDocument::new("103", "Thanks, that helped!"),
    ]
}

fn embedded(id: &str, vector: Vec<f32>) -> EmbeddedChunk {
    EmbeddedChunk::new(
        Chunk {
            id: ChunkId::from(id),
            text: format!("text {id}"),
            index: 0,
            metadata: Metadata::new(),
        },
        Embedding::Real(vector),
    )
}

// -- End to end --

async fn ingest_and_query(backend: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let app = AppContext::open(config_for(dir.path(), backend)).await.unwrap();
    assert_eq!(app.backend(), backend);

    let embedder = MockEmbedder::new(DIM);
    let query = embedder.vector_for("how do I mount the project folder in the docker container");
    let report = app.pipeline(Arc::new(embedder)).ingest(&posts()).await.unwrap();

    assert_eq!(report.documents_seen, 3);
    assert_eq!(report.documents_processed, 2);
    assert_eq!(report.documents_skipped, 1);
    assert_eq!(report.chunks_inserted, report.chunks_created);
    assert!(report.errors.is_empty());

    let hits = app.retriever().search(&query, Some(3), None).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].metadata["source_id"].as_str(), Some("102"));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    assert!(
        hits.iter().all(|h| !h.text.contains("Regards")),
        "signatures are stripped before chunking"
    );
}

#[tokio::test]
async fn end_to_end_flat() {
    ingest_and_query(BackendKind::Flat).await;
}

#[tokio::test]
async fn end_to_end_collection() {
    ingest_and_query(BackendKind::Collection).await;
}

#[tokio::test]
async fn flat_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), BackendKind::Flat);
    let count = {
        let app = AppContext::open(config.clone()).await.unwrap();
        let report = app
            .pipeline(Arc::new(MockEmbedder::new(DIM)))
            .ingest(&posts())
            .await
            .unwrap();
        report.chunks_inserted
    };

    let app = AppContext::open(config).await.unwrap();
    let stats = app.retriever().stats().await.unwrap();
    assert_eq!(stats.backend, "flat");
    assert_eq!(stats.count, count);
    assert_eq!(stats.dimension, Some(DIM));
}

#[tokio::test]
async fn rebuild_drops_stale_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let app = AppContext::open(config_for(dir.path(), BackendKind::Flat))
        .await
        .unwrap();
    let pipeline = app.pipeline(Arc::new(MockEmbedder::new(DIM)));
    pipeline.ingest(&posts()).await.unwrap();

    let report = pipeline.rebuild(&posts()[1..2]).await.unwrap();

    let stats = app.retriever().stats().await.unwrap();
    assert_eq!(stats.count, report.chunks_inserted);
}

#[tokio::test]
async fn embedder_outage_still_indexes_flagged_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let app = AppContext::open(config_for(dir.path(), BackendKind::Collection))
        .await
        .unwrap();
    let report = app
        .pipeline(Arc::new(MockEmbedder::new(DIM).failing()))
        .ingest(&posts())
        .await
        .unwrap();
    assert_eq!(report.fallback_embeddings, report.chunks_created);

    let query = embedding::fallback_vector("anything", DIM);
    let hits = app.retriever().search(&query, Some(50), None).await.unwrap();
    assert_eq!(hits.len(), report.chunks_inserted);
    assert!(hits.iter().all(sift_memory::ScoredChunk::is_fallback));
}

// -- Store contract --

#[tokio::test]
async fn exact_vector_scores_one() {
    let dir = tempfile::tempdir().unwrap();
    for backend in [BackendKind::Flat, BackendKind::Collection] {
        let app = AppContext::open(config_for(&dir.path().join(backend.as_str()), backend))
            .await
            .unwrap();
        let store = app.store();
        let mut a = vec![0.0; DIM];
        a[0] = 1.0;
        let mut b = vec![0.0; DIM];
        b[1] = 1.0;
        store
            .add(vec![embedded("first", a.clone()), embedded("second", b)])
            .await
            .unwrap();

        let hits = store.search(a, 1).await.unwrap();
        assert_eq!(hits[0].id.as_str(), "first", "{backend:?}");
        assert!((hits[0].score - 1.0).abs() < 1e-6, "{backend:?}");
    }
}

#[tokio::test]
async fn dimension_mismatch_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    for backend in [BackendKind::Flat, BackendKind::Collection] {
        let app = AppContext::open(config_for(&dir.path().join(backend.as_str()), backend))
            .await
            .unwrap();
        let store = app.store();
        store.add(vec![embedded("ok", vec![0.5; DIM])]).await.unwrap();

        let err = store
            .upsert(vec![embedded("new", vec![0.5; DIM]), embedded("bad", vec![0.5; 3])])
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{backend:?}: {err}");
        assert_eq!(store.stats().await.unwrap().count, 1, "{backend:?}");
    }
}

#[tokio::test]
async fn clear_is_idempotent_on_both_backends() {
    let dir = tempfile::tempdir().unwrap();
    for backend in [BackendKind::Flat, BackendKind::Collection] {
        let app = AppContext::open(config_for(&dir.path().join(backend.as_str()), backend))
            .await
            .unwrap();
        let store = app.store();
        store.add(vec![embedded("x", vec![1.0; DIM])]).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.stats().await.unwrap().count, 0, "{backend:?}");
        store.add(vec![embedded("y", vec![1.0; DIM])]).await.unwrap();
        assert_eq!(store.stats().await.unwrap().count, 1, "{backend:?}");
    }
}

#[tokio::test]
async fn broken_flat_pair_falls_back_to_collection() {
    let dir = tempfile::tempdir().unwrap();
    {
        let flat = FlatIndexStore::open(dir.path(), DIM).unwrap();
        flat.add(vec![embedded("a", vec![1.0; DIM])]).await.unwrap();
        flat.persist().await.unwrap();
    }
    std::fs::remove_file(dir.path().join(sift_memory::flat::META_FILE)).unwrap();

    let app = AppContext::open(config_for(dir.path(), BackendKind::Flat))
        .await
        .unwrap();
    assert_eq!(app.backend(), BackendKind::Collection);
}

#[tokio::test]
async fn no_backend_is_fatal() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let err = AppContext::open(config_for(file.path(), BackendKind::Flat))
        .await
        .unwrap_err();
    let store_err = err.downcast_ref::<StoreError>().unwrap();
    assert!(matches!(store_err, StoreError::NoBackendAvailable { .. }));
}

// -- Config --

#[tokio::test]
#[serial]
async fn app_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join("store");
    let path = dir.path().join("sift.toml");
    std::fs::write(
        &path,
        format!(
            "[embedding]\ndimension = 8\n\n[store]\nbackend = \"flat\"\npath = \"{}\"\n",
            store_dir.display()
        ),
    )
    .unwrap();

    let app = AppContext::from_path(&path).await.unwrap();
    assert_eq!(app.backend(), BackendKind::Flat);
    assert_eq!(app.config().embedding.dimension, 8);
    let stats = app.retriever().stats().await.unwrap();
    assert_eq!(stats.location, store_dir.display().to_string());
}

#[test]
fn splitter_from_config_respects_sizes() {
    let mut config = Config::default();
    config.chunking.target_size = 5;
    config.chunking.overlap = 2;
    let splitter = TextSplitter::new(config.chunking);
    let chunks = splitter.split("One two three four. Five six seven eight. Nine ten eleven.");
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.word_count() <= 5));
}
