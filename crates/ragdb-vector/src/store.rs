//! On-disk persistence for a `FlatIndex` and its parallel chunk list.
//!
//! A store directory holds two files that are only valid as a pair:
//! `vectors.bin` (bincode: manifest header followed by the row-major vector
//! buffer) and `chunks.json` (the chunk records, position `i` belonging to
//! vector id `i`). The manifest records the blake3 digest of `chunks.json`
//! so a mismatched pair is detected on load.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use ragdb_core::types::DocumentChunk;
use ragdb_core::{Error, Result, VectorIndex};

use crate::flat::FlatIndex;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const CHUNKS_FILE: &str = "chunks.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedder_id: String,
    pub dim: usize,
    pub count: usize,
    pub built_at_ms: i64,
    pub chunks_digest: String,
}

impl IndexManifest {
    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.built_at_ms)
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    manifest: IndexManifest,
    data: Vec<f32>,
}

/// Index, chunks and manifest read back from a store.
#[derive(Debug, Clone)]
pub struct StoredIndex {
    pub index: FlatIndex,
    pub chunks: Vec<DocumentChunk>,
    pub manifest: IndexManifest,
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    fn chunks_path(&self) -> PathBuf {
        self.dir.join(CHUNKS_FILE)
    }

    pub fn exists(&self) -> bool {
        self.vectors_path().is_file() && self.chunks_path().is_file()
    }

    /// Writes `chunks` and the vectors of `index`. Each file is replaced
    /// atomically; the pair as a whole is not, which `load` detects through
    /// the chunk digest.
    pub fn save(&self, index: &FlatIndex, chunks: &[DocumentChunk], embedder_id: &str) -> Result<IndexManifest> {
        if chunks.len() != index.len() {
            return Err(Error::InvalidArgument(format!(
                "{} chunks for {} vectors",
                chunks.len(),
                index.len()
            )));
        }
        fs::create_dir_all(&self.dir)?;

        let chunk_bytes = serde_json::to_vec(chunks).map_err(|e| Error::Storage(format!("encoding chunks: {e}")))?;
        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedder_id: embedder_id.to_string(),
            dim: index.dim(),
            count: index.len(),
            built_at_ms: Utc::now().timestamp_millis(),
            chunks_digest: blake3::hash(&chunk_bytes).to_hex().to_string(),
        };
        let persisted = PersistedIndex { manifest, data: index.as_slice().to_vec() };
        let vector_bytes =
            bincode::serialize(&persisted).map_err(|e| Error::Storage(format!("encoding vectors: {e}")))?;

        write_atomic(&self.dir, CHUNKS_FILE, &chunk_bytes)?;
        write_atomic(&self.dir, VECTORS_FILE, &vector_bytes)?;
        tracing::info!(
            dir = %self.dir.display(),
            count = persisted.manifest.count,
            dim = persisted.manifest.dim,
            "index saved"
        );
        Ok(persisted.manifest)
    }

    /// Reads only the manifest header of `vectors.bin`.
    pub fn manifest(&self) -> Result<IndexManifest> {
        let path = self.vectors_path();
        let file = File::open(&path).map_err(|e| not_found_or_io(e, &path))?;
        bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| Error::CorruptIndex(format!("{}: {e}", path.display())))
    }

    /// Loads and validates the pair, then checks the persisted dimension
    /// against `expected_dim`.
    pub fn load(&self, expected_dim: usize) -> Result<StoredIndex> {
        let stored = self.verify()?;
        if stored.manifest.dim != expected_dim {
            return Err(Error::CorruptIndex(format!(
                "index has dimension {}, embedder produces {expected_dim}",
                stored.manifest.dim
            )));
        }
        Ok(stored)
    }

    /// Loads the pair and checks it is self-consistent.
    pub fn verify(&self) -> Result<StoredIndex> {
        let vectors_path = self.vectors_path();
        let chunks_path = self.chunks_path();
        let vector_bytes = fs::read(&vectors_path).map_err(|e| not_found_or_io(e, &vectors_path))?;
        let chunk_bytes = match fs::read(&chunks_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::CorruptIndex(format!("{} is missing", chunks_path.display())));
            }
            Err(e) => return Err(e.into()),
        };

        let persisted: PersistedIndex = bincode::deserialize(&vector_bytes)
            .map_err(|e| Error::CorruptIndex(format!("{}: {e}", vectors_path.display())))?;
        let PersistedIndex { manifest, data } = persisted;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                manifest.format_version
            )));
        }
        if manifest.dim == 0 {
            return Err(Error::CorruptIndex(format!("{} declares dimension 0", vectors_path.display())));
        }
        let digest = blake3::hash(&chunk_bytes).to_hex().to_string();
        if digest != manifest.chunks_digest {
            return Err(Error::CorruptIndex(format!("{} does not match the vector file", chunks_path.display())));
        }
        let chunks: Vec<DocumentChunk> = serde_json::from_slice(&chunk_bytes)
            .map_err(|e| Error::CorruptIndex(format!("{}: {e}", chunks_path.display())))?;

        let index = FlatIndex::with_vectors(manifest.dim, data)?;
        if index.len() != manifest.count {
            return Err(Error::CorruptIndex(format!(
                "manifest declares {} vectors, file holds {}",
                manifest.count,
                index.len()
            )));
        }
        if chunks.len() != index.len() {
            return Err(Error::CorruptIndex(format!("{} chunks for {} vectors", chunks.len(), index.len())));
        }
        tracing::debug!(dir = %self.dir.display(), count = index.len(), "index loaded");
        Ok(StoredIndex { index, chunks, manifest })
    }

    /// Removes a previous build. A store that was never written is fine.
    pub fn clear(&self) -> Result<()> {
        for path in [self.vectors_path(), self.chunks_path()] {
            match fs::remove_file(&path) {
                Ok(()) => tracing::info!(path = %path.display(), "removed previous index file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn not_found_or_io(e: io::Error, path: &Path) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::NotFound(format!("index file {}", path.display()))
    } else {
        Error::Io(e)
    }
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}
