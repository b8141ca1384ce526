use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{SearchHit, SourceFormat};

/// Batch text-to-vector capability wrapping an external model.
///
/// `embed_batch` is order preserving: output `i` belongs to input `i`, and
/// every vector has exactly `dim()` components. Vectors are not required to
/// be normalized; callers normalize before touching an index.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model, e.g. `local:all-MiniLM-L6-v2:d384`.
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Exact similarity index over L2-normalized vectors.
///
/// Ids are assigned in insertion order starting at zero. Normalization of
/// both stored and query vectors is the caller's job.
pub trait VectorIndex: Send + Sync {
    fn dim(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Appends all vectors or none of them.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()>;
    /// Up to `k` hits by descending score; ties go to the lower id.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// Where documents come from and how their text is obtained.
pub trait DocumentSource: Send + Sync {
    fn format(&self) -> SourceFormat;
    /// Sorted list of candidate files under `root`; a missing root is
    /// `Error::DirectoryNotFound`.
    fn discover(&self, root: &Path) -> Result<Vec<PathBuf>>;
    /// Full text of one document; failures are `Error::DocumentRead`.
    fn read_text(&self, path: &Path) -> Result<String>;
}
