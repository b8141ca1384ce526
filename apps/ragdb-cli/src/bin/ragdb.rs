use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

use ragdb_core::config::{Config, RagConfig, StoreBackend};
use ragdb_core::source::source_for;
use ragdb_core::types::{QueryResponse, QueryResult, SourceFormat};
use ragdb_core::Chunker;
use ragdb_embed::embedder_from_config;
use ragdb_pipeline::{IngestOutcome, IngestionPipeline, QueryContext};
use ragdb_vector::IndexStore;

/// Build and query a local retrieval index over markdown or PDF documents.
#[derive(Parser, Debug)]
#[command(name = "ragdb", version, about = "Local document chunk index for retrieval")]
struct Cli {
    /// Use the deterministic fake embedder instead of loading a model.
    #[arg(long, global = true, env = "APP_USE_FAKE_EMBEDDINGS")]
    fake: bool,
    /// Storage backend (defaults to `store.backend`).
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,
    /// Index directory (defaults to `index.dir`).
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild the index from a document directory.
    Ingest {
        /// Source directory (defaults to `data.source_dir`).
        dir: Option<PathBuf>,
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Find the chunks most similar to a query.
    Query {
        text: String,
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
        /// Drop results scoring below this similarity.
        #[arg(long)]
        min_score: Option<f32>,
        /// Print the endpoint response shape as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Validate the stored index and print its manifest.
    Status,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KindArg {
    Markdown,
    Pdf,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BackendArg {
    File,
    Lancedb,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut settings = Config::load()
        .and_then(|c| c.settings())
        .context("loading configuration")?;
    apply_globals(&cli, &mut settings);
    tracing::debug!(
        backend = ?settings.store.backend,
        index_dir = %settings.index.dir,
        fake = settings.embedding.use_fake,
        "configuration loaded"
    );

    match cli.command {
        Commands::Ingest { dir, kind, chunk_size, overlap } => {
            if let Some(dir) = dir {
                settings.data.source_dir = dir.to_string_lossy().into_owned();
            }
            if let Some(kind) = kind {
                settings.data.source_kind = match kind {
                    KindArg::Markdown => SourceFormat::Markdown,
                    KindArg::Pdf => SourceFormat::Pdf,
                };
            }
            settings.chunking.chunk_size = chunk_size.unwrap_or(settings.chunking.chunk_size);
            settings.chunking.overlap = overlap.unwrap_or(settings.chunking.overlap);
            settings.validate()?;
            ingest(&settings)
        }
        Commands::Query { text, top_n, min_score, json } => {
            settings.query.top_n = top_n.unwrap_or(settings.query.top_n);
            settings.query.min_score = min_score.or(settings.query.min_score);
            settings.validate()?;
            query(&settings, &text, json)
        }
        Commands::Status => status(&settings),
    }
}

fn apply_globals(cli: &Cli, settings: &mut RagConfig) {
    settings.embedding.use_fake |= cli.fake;
    if let Some(backend) = cli.backend {
        settings.store.backend = match backend {
            BackendArg::File => StoreBackend::File,
            BackendArg::Lancedb => StoreBackend::Lancedb,
        };
    }
    if let Some(dir) = &cli.index_dir {
        settings.index.dir = dir.to_string_lossy().into_owned();
    }
}

fn ingest(settings: &RagConfig) -> Result<()> {
    let root = settings.data.source_dir();
    let source = source_for(settings.data.source_kind);
    let chunker = Chunker::new(settings.chunking.chunk_size, settings.chunking.overlap)?;
    let embedder = embedder_from_config(&settings.embedding)?;
    let pipeline = IngestionPipeline::new(source.as_ref(), embedder.as_ref(), chunker)
        .with_batch_size(settings.embedding.batch_size)
        .with_progress(std::io::stderr().is_terminal());

    println!("Ingesting {} documents from {}", settings.data.source_kind, root.display());
    let outcome = match settings.store.backend {
        StoreBackend::File => pipeline.run(&root, &IndexStore::new(settings.index.dir()))?,
        StoreBackend::Lancedb => ingest_lance(&pipeline, settings, &root, embedder.dim())?,
    };

    match outcome {
        IngestOutcome::Indexed(report) => {
            println!(
                "Indexed {} chunks (dim {}) from {} documents, {} skipped",
                report.chunks, report.dim, report.documents, report.skipped
            );
        }
        IngestOutcome::EmptyCorpus { documents, skipped } => {
            println!(
                "No valid chunks found ({documents} documents read, {skipped} skipped); nothing indexed"
            );
        }
    }
    Ok(())
}

#[cfg(feature = "lancedb")]
fn ingest_lance(
    pipeline: &IngestionPipeline<'_>,
    settings: &RagConfig,
    root: &std::path::Path,
    dim: usize,
) -> Result<IngestOutcome> {
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let store =
            ragdb_vector::LanceStore::open(&lance_dir(settings), &settings.store.collection, dim).await?;
        pipeline.run_into_lance(root, &store).await
    })?;
    Ok(outcome)
}

#[cfg(not(feature = "lancedb"))]
fn ingest_lance(
    _: &IngestionPipeline<'_>,
    _: &RagConfig,
    _: &std::path::Path,
    _: usize,
) -> Result<IngestOutcome> {
    anyhow::bail!("this build has no LanceDB support; rebuild with `--features lancedb`")
}

#[cfg(feature = "lancedb")]
fn lance_dir(settings: &RagConfig) -> PathBuf {
    ragdb_core::config::expand_path(&settings.store.lancedb_dir)
}

fn query(settings: &RagConfig, text: &str, json: bool) -> Result<()> {
    let results = match settings.store.backend {
        StoreBackend::File => {
            let mut ctx = QueryContext::open(settings)?;
            let results = ctx.search(text)?;
            ctx.close();
            results
        }
        StoreBackend::Lancedb => query_lance(settings, text)?,
    };
    tracing::info!(returned = results.len(), "query finished");
    print_results(results, json)
}

#[cfg(feature = "lancedb")]
fn query_lance(settings: &RagConfig, text: &str) -> Result<Vec<QueryResult>> {
    let embedder = embedder_from_config(&settings.embedding)?;
    let raw = embedder.embed_batch(&[text.to_string()])?.pop().context("embedder returned no vector")?;
    let q = ragdb_core::normalize(&raw)?;
    let rt = tokio::runtime::Runtime::new()?;
    let dir = lance_dir(settings);
    let mut results = rt.block_on(async {
        let store = ragdb_vector::LanceStore::open(&dir, &settings.store.collection, embedder.dim()).await?;
        store.search(&q, settings.query.top_n).await
    })?;
    if let Some(min) = settings.query.min_score {
        results.retain(|r| r.score >= min);
    }
    Ok(results)
}

#[cfg(not(feature = "lancedb"))]
fn query_lance(_: &RagConfig, _: &str) -> Result<Vec<QueryResult>> {
    anyhow::bail!("this build has no LanceDB support; rebuild with `--features lancedb`")
}

fn print_results(results: Vec<QueryResult>, json: bool) -> Result<()> {
    if json {
        let response = QueryResponse::from(results);
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for r in &results {
        println!("{}. [{:.4}] {}", r.rank + 1, r.score, r.id);
        println!("{}\n", r.chunk);
    }
    Ok(())
}

fn status(settings: &RagConfig) -> Result<()> {
    if settings.store.backend == StoreBackend::Lancedb {
        return status_lance(settings);
    }
    let store = IndexStore::new(settings.index.dir());
    let stored = store.verify().map_err(|e| {
        tracing::error!(dir = %store.dir().display(), error = %e, "index failed validation");
        e
    });
    let stored = stored.with_context(|| format!("index at {}", store.dir().display()))?;
    let m = &stored.manifest;
    println!("Index:       {}", store.dir().display());
    println!("Chunks:      {}", m.count);
    println!("Dimension:   {}", m.dim);
    println!("Embedder:    {}", m.embedder_id);
    match m.built_at() {
        Some(at) => println!("Built at:    {}", at.to_rfc3339()),
        None => println!("Built at:    unknown"),
    }
    Ok(())
}

#[cfg(feature = "lancedb")]
fn status_lance(settings: &RagConfig) -> Result<()> {
    let dim = if settings.embedding.use_fake {
        ragdb_embed::DEFAULT_DIM
    } else {
        embedder_from_config(&settings.embedding)?.dim()
    };
    let rt = tokio::runtime::Runtime::new()?;
    let count = rt.block_on(async {
        let store =
            ragdb_vector::LanceStore::open(&lance_dir(settings), &settings.store.collection, dim).await?;
        store.count().await
    })?;
    println!("Collection:  {} ({})", settings.store.collection, lance_dir(settings).display());
    println!("Chunks:      {count}");
    Ok(())
}

#[cfg(not(feature = "lancedb"))]
fn status_lance(_: &RagConfig) -> Result<()> {
    anyhow::bail!("this build has no LanceDB support; rebuild with `--features lancedb`")
}
