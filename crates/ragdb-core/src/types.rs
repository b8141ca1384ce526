//! Domain types shared by the ingestion and query paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;

/// Default number of results returned when a request does not say.
pub const DEFAULT_TOP_N: usize = 3;

/// Identifier of the chunk at `global_index` in corpus order.
pub fn chunk_id(global_index: usize) -> ChunkId {
    format!("chunk_{global_index}")
}

/// Corpus position encoded in an id built by `chunk_id`.
pub fn chunk_position(id: &str) -> Option<usize> {
    id.strip_prefix("chunk_")?.parse().ok()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Markdown,
    Pdf,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Markdown => f.write_str("markdown"),
            Self::Pdf => f.write_str("pdf"),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            other => Err(Error::InvalidConfig(format!("unknown source kind '{other}'"))),
        }
    }
}

/// A source document, read once during ingestion and never persisted.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub content: String,
    pub format: SourceFormat,
}

/// A chunk of a source document that is independently indexed.
///
/// - `id`: `chunk_<global_index>`, unique and stable across save/load
/// - `doc_id`: file stem of the source document
/// - `doc_path`: original path to the source file
/// - `content`: the trimmed text payload
/// - `chunk_index`/`total_chunks`: position within the parent document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub doc_path: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// Raw index hit: insertion-order id and cosine similarity in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: usize,
    pub score: f32,
}

/// A ranked chunk returned to query callers. `rank` 0 is the most similar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub id: ChunkId,
    pub chunk: String,
    pub score: f32,
    pub rank: usize,
}

/// Wire shape of the query endpoint request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_n")]
    pub top_n: i64,
}

#[allow(clippy::cast_possible_wrap)]
fn default_top_n() -> i64 {
    DEFAULT_TOP_N as i64
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultItem {
    pub chunk: String,
    pub score: f32,
}

/// Wire shape of the query endpoint response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub results: Vec<ResultItem>,
}

impl QueryResponse {
    /// Highest score in the response, `None` when there are no results.
    pub fn best_score(&self) -> Option<f32> {
        self.results.iter().map(|r| r.score).reduce(f32::max)
    }
}

impl From<Vec<QueryResult>> for QueryResponse {
    fn from(results: Vec<QueryResult>) -> Self {
        Self { results: results.into_iter().map(|r| ResultItem { chunk: r.chunk, score: r.score }).collect() }
    }
}
