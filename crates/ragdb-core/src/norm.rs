//! L2 normalization for cosine-via-dot-product search.

use crate::error::{Error, Result};

/// Returns `v / ||v||_2`. A zero (or non-finite) norm is `Error::ZeroVector`.
pub fn normalize(v: &[f32]) -> Result<Vec<f32>> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(Error::ZeroVector);
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

/// Normalizes every vector, failing on the first degenerate one.
pub fn normalize_batch(vectors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
    vectors.iter().map(|v| normalize(v)).collect()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
