//! Exact brute-force inner-product index.
//!
//! Vectors live in one contiguous row-major buffer. With L2-normalized
//! inputs the inner product is the cosine similarity, so scores fall in
//! `[-1, 1]` and ranking is exact.
use std::cmp::Ordering;

use ragdb_core::norm::dot;
use ragdb_core::types::SearchHit;
use ragdb_core::{Error, Result, VectorIndex};

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidArgument("index dimension must be greater than zero".into()));
        }
        Ok(Self { dim, data: Vec::new() })
    }

    /// Rebuilds an index from a row-major buffer, e.g. one read back from disk.
    pub fn with_vectors(dim: usize, data: Vec<f32>) -> Result<Self> {
        let mut index = Self::new(dim)?;
        if data.len() % dim != 0 {
            return Err(Error::CorruptIndex(format!(
                "vector buffer of {} floats is not a multiple of dimension {dim}",
                data.len()
            )));
        }
        index.data = data;
        Ok(index)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    fn check_dim(&self, actual: usize) -> Result<()> {
        if actual == self.dim {
            Ok(())
        } else {
            Err(Error::DimensionMismatch { expected: self.dim, actual })
        }
    }
}

impl VectorIndex for FlatIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for v in vectors {
            self.check_dim(v.len())?;
        }
        self.data.reserve(vectors.len() * self.dim);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.check_dim(query.len())?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(id, row)| SearchHit { id, score: dot(row, query) })
            .collect();
        hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        });
        hits.truncate(k);
        Ok(hits)
    }
}
