use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use sift_core::{AppContext, Config, resolve_config_path};
use sift_memory::document::{TextSplitter, normalize_text};
use sift_memory::{Chunk, ChunkId, EmbeddedChunk, Embedding, Metadata, VectorStore};

#[derive(Parser, Debug)]
#[command(
    name = "sift",
    version,
    about = "Chunk text, index embeddings and retrieve similar passages"
)]
struct Cli {
    /// Path to the TOML config (falls back to SIFT_CONFIG, then config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize and chunk a text file, printing one JSON chunk per line
    Chunk {
        file: PathBuf,
        /// Skip signature and whitespace normalization
        #[arg(long)]
        raw: bool,
    },
    /// Upsert pre-embedded records from a JSONL file, then persist
    Ingest { input: PathBuf },
    /// Nearest chunks to a query vector
    Search {
        /// Query vector as a JSON array, e.g. "[0.1, 0.2, 0.3]"
        #[arg(long)]
        vector: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        min_similarity: Option<f32>,
    },
    /// Delete chunks by id, then persist
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print backend, entry count and dimension
    Stats,
    /// Remove every entry, then persist
    Clear,
}

/// One line of an ingest file.
#[derive(Debug, Deserialize)]
struct IngestRecord {
    #[serde(default)]
    id: Option<String>,
    text: String,
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
    #[serde(default)]
    metadata: Metadata,
}

impl From<IngestRecord> for EmbeddedChunk {
    fn from(record: IngestRecord) -> Self {
        let id = record.id.map_or_else(ChunkId::random, ChunkId::from);
        EmbeddedChunk::new(
            Chunk {
                id,
                text: record.text,
                index: record.index,
                metadata: record.metadata,
            },
            Embedding::Real(record.embedding),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let mut out = io::stdout().lock();

    match cli.command {
        Command::Chunk { file, raw } => {
            let config = Config::load(&config_path)?;
            config.validate()?;
            chunk_file(&TextSplitter::new(config.chunking), &file, raw, &mut out)
        }
        command => {
            let app = AppContext::from_path(&config_path).await?;
            run(&app, command, &mut out).await
        }
    }
}

async fn run(app: &AppContext, command: Command, out: &mut impl Write) -> anyhow::Result<()> {
    let store = app.store();
    match command {
        Command::Chunk { file, raw } => chunk_file(&app.splitter(), &file, raw, out)?,
        Command::Ingest { input } => {
            let batch_size = app.config().ingest.batch_size;
            let inserted = ingest_jsonl(store.as_ref(), &input, batch_size).await?;
            persist(store.as_ref()).await;
            writeln!(out, "{}", serde_json::json!({ "inserted": inserted }))?;
        }
        Command::Search {
            vector,
            top_k,
            min_similarity,
        } => {
            let query: Vec<f32> =
                serde_json::from_str(&vector).context("--vector must be a JSON array of numbers")?;
            let hits = app.retriever().search(&query, top_k, min_similarity).await?;
            for hit in hits {
                writeln!(out, "{}", serde_json::to_string(&hit)?)?;
            }
        }
        Command::Delete { ids } => {
            let deleted = store
                .delete(ids.into_iter().map(ChunkId::from).collect())
                .await?;
            persist(store.as_ref()).await;
            writeln!(out, "{}", serde_json::json!({ "deleted": deleted }))?;
        }
        Command::Stats => {
            let stats = app.retriever().stats().await?;
            writeln!(out, "{}", serde_json::to_string(&stats)?)?;
        }
        Command::Clear => {
            store.clear().await?;
            persist(store.as_ref()).await;
            writeln!(out, "{}", serde_json::json!({ "cleared": true }))?;
        }
    }
    Ok(())
}

fn chunk_file(splitter: &TextSplitter, file: &Path, raw: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let text = if raw { text } else { normalize_text(&text) };
    for chunk in splitter.split(&text) {
        writeln!(out, "{}", serde_json::to_string(&chunk)?)?;
    }
    Ok(())
}

fn parse_record(line: &str, line_no: usize) -> anyhow::Result<Option<EmbeddedChunk>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let record: IngestRecord = serde_json::from_str(line)
        .with_context(|| format!("invalid record on line {line_no}"))?;
    if record.embedding.is_empty() {
        bail!("record on line {line_no} has an empty embedding");
    }
    Ok(Some(record.into()))
}

async fn ingest_jsonl(store: &dyn VectorStore, input: &Path, batch_size: usize) -> anyhow::Result<usize> {
    let file = File::open(input)
        .with_context(|| format!("failed to open ingest input {}", input.display()))?;
    let batch_size = batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let mut inserted = 0;

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        if let Some(doc) = parse_record(&line, idx + 1)? {
            batch.push(doc);
        }
        if batch.len() >= batch_size {
            inserted += store.upsert(std::mem::take(&mut batch)).await?;
        }
    }
    if !batch.is_empty() {
        inserted += store.upsert(batch).await?;
    }
    tracing::info!(backend = store.backend(), inserted, "ingest file loaded");
    Ok(inserted)
}

async fn persist(store: &dyn VectorStore) {
    if let Err(e) = store.persist().await {
        tracing::warn!(backend = store.backend(), error = %e, "persist failed, in-memory state kept");
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
