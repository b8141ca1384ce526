//! Batch ingestion: discover, chunk, embed, index, persist.
//!
//! A run walks `Idle → Discovering → Chunking → Embedding → Indexing →
//! Persisting → Done`. A missing root fails before anything is written;
//! documents that cannot be read are logged and skipped; a corpus with no
//! chunks ends the run early as `IngestOutcome::EmptyCorpus` and leaves the
//! destination untouched.
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::Cell;
use std::fmt;
use std::path::Path;

use ragdb_core::source::load_document;
use ragdb_core::types::{chunk_id, DocumentChunk};
use ragdb_core::{normalize_batch, Chunker, DocumentSource, Embedder, Error, Result, VectorIndex};
use ragdb_vector::{FlatIndex, IndexStore};

pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Idle,
    Discovering,
    Chunking,
    Embedding,
    Indexing,
    Persisting,
    Done,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Persisting => "persisting",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Documents read successfully, including ones that produced no chunks.
    pub documents: usize,
    pub skipped: usize,
    pub chunks: usize,
    pub dim: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed(IngestReport),
    /// Nothing to index; no state was written.
    EmptyCorpus { documents: usize, skipped: usize },
}

/// Chunks gathered from one source directory, in corpus order.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub chunks: Vec<DocumentChunk>,
    pub documents: usize,
    pub skipped: usize,
}

pub struct IngestionPipeline<'a> {
    source: &'a dyn DocumentSource,
    embedder: &'a dyn Embedder,
    chunker: Chunker,
    batch_size: usize,
    progress: bool,
    stage: Cell<IngestStage>,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(source: &'a dyn DocumentSource, embedder: &'a dyn Embedder, chunker: Chunker) -> Self {
        Self {
            source,
            embedder,
            chunker,
            batch_size: DEFAULT_BATCH_SIZE,
            progress: false,
            stage: Cell::new(IngestStage::Idle),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Show a progress bar on stderr while embedding.
    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Stage the last run reached.
    pub fn stage(&self) -> IngestStage {
        self.stage.get()
    }

    fn enter(&self, stage: IngestStage) {
        tracing::info!(%stage, "ingestion stage");
        self.stage.set(stage);
    }

    /// Full rebuild of the index stored at `store` from the documents under `root`.
    pub fn run(&self, root: &Path, store: &IndexStore) -> Result<IngestOutcome> {
        self.stage.set(IngestStage::Idle);
        let corpus = self.collect(root)?;
        if corpus.chunks.is_empty() {
            return Ok(self.finish_empty(&corpus));
        }
        let vectors = self.embed(&corpus.chunks)?;

        self.enter(IngestStage::Indexing);
        let mut index = FlatIndex::new(self.embedder.dim())?;
        index.add(&vectors)?;

        self.enter(IngestStage::Persisting);
        if let Ok(previous) = store.manifest() {
            tracing::info!(
                dir = %store.dir().display(),
                chunks = previous.count,
                embedder = %previous.embedder_id,
                "replacing previous index"
            );
        }
        if let Err(e) = store.clear() {
            tracing::warn!(dir = %store.dir().display(), error = %e, "could not clear previous index");
        }
        store.save(&index, &corpus.chunks, self.embedder.id())?;
        let reloaded = store.load(index.dim())?;
        if reloaded.index.len() != index.len() || reloaded.chunks.len() != corpus.chunks.len() {
            return Err(Error::CorruptIndex(format!(
                "saved {} vectors but read back {}",
                index.len(),
                reloaded.index.len()
            )));
        }

        Ok(self.finish(&corpus, index.dim()))
    }

    /// Rebuilds a LanceDB collection instead of a file store.
    #[cfg(feature = "lancedb")]
    pub async fn run_into_lance(&self, root: &Path, store: &ragdb_vector::LanceStore) -> Result<IngestOutcome> {
        self.stage.set(IngestStage::Idle);
        let corpus = self.collect(root)?;
        if corpus.chunks.is_empty() {
            return Ok(self.finish_empty(&corpus));
        }
        let vectors = self.embed(&corpus.chunks)?;

        self.enter(IngestStage::Indexing);
        store.delete_collection().await;
        store.get_or_create().await?;

        self.enter(IngestStage::Persisting);
        store.add(&corpus.chunks, &vectors).await?;
        let stored = store.count().await?;
        if stored != corpus.chunks.len() {
            let added = corpus.chunks.len();
            return Err(Error::CorruptIndex(format!("added {added} rows but collection holds {stored}")));
        }

        Ok(self.finish(&corpus, self.embedder.dim()))
    }

    /// Discovering and Chunking: reads every document under `root` and
    /// splits it, assigning ids in corpus order.
    pub fn collect(&self, root: &Path) -> Result<Corpus> {
        self.enter(IngestStage::Discovering);
        let paths = self.source.discover(root)?;
        tracing::info!(
            root = %root.display(),
            files = paths.len(),
            format = %self.source.format(),
            "discovered documents"
        );

        self.enter(IngestStage::Chunking);
        tracing::debug!(chunk_size = self.chunker.chunk_size(), overlap = self.chunker.overlap(), "chunker settings");
        let mut corpus = Corpus::default();
        for path in &paths {
            let doc = match load_document(self.source, path) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping document");
                    corpus.skipped += 1;
                    continue;
                }
            };
            corpus.documents += 1;
            let pieces = self.chunker.split(&doc.content);
            tracing::debug!(path = %path.display(), chunks = pieces.len(), "chunked document");
            let doc_id = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
            let doc_path = path.display().to_string();
            let total = pieces.len();
            for (i, content) in pieces.into_iter().enumerate() {
                corpus.chunks.push(DocumentChunk {
                    id: chunk_id(corpus.chunks.len()),
                    doc_id: doc_id.clone(),
                    doc_path: doc_path.clone(),
                    content,
                    chunk_index: i,
                    total_chunks: total,
                });
            }
        }
        tracing::info!(
            documents = corpus.documents,
            skipped = corpus.skipped,
            chunks = corpus.chunks.len(),
            "chunking finished"
        );
        Ok(corpus)
    }

    /// Embedding: embeds all chunks in batches and L2-normalizes the result.
    pub fn embed(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>> {
        self.enter(IngestStage::Embedding);
        let pb = self.progress_bar(chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts)?;
            if embedded.len() != texts.len() {
                return Err(Error::Embedding(format!("{} vectors for {} texts", embedded.len(), texts.len())));
            }
            if let Some(v) = embedded.iter().find(|v| v.len() != self.embedder.dim()) {
                return Err(Error::DimensionMismatch { expected: self.embedder.dim(), actual: v.len() });
            }
            vectors.extend(normalize_batch(&embedded)?);
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();
        Ok(vectors)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    fn finish_empty(&self, corpus: &Corpus) -> IngestOutcome {
        tracing::warn!(
            documents = corpus.documents,
            skipped = corpus.skipped,
            "no valid chunks found, nothing to index"
        );
        self.enter(IngestStage::Done);
        IngestOutcome::EmptyCorpus { documents: corpus.documents, skipped: corpus.skipped }
    }

    fn finish(&self, corpus: &Corpus, dim: usize) -> IngestOutcome {
        self.enter(IngestStage::Done);
        let report =
            IngestReport { documents: corpus.documents, skipped: corpus.skipped, chunks: corpus.chunks.len(), dim };
        tracing::info!(chunks = report.chunks, dim, skipped = report.skipped, "ingestion complete");
        IngestOutcome::Indexed(report)
    }
}
