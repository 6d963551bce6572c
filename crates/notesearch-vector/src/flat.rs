use rayon::prelude::*;
use std::cmp::Ordering;

use notesearch_core::types::{ChunkMeta, ScoredChunk};
use notesearch_core::{Error, Result};

/// Exact inner-product index over a row-major `Vec<f32>`.
///
/// Row `i` of `data` belongs to `entries[i]`; the two never differ in length.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
    entries: Vec<ChunkMeta>,
}

impl FlatIndex {
    pub fn build(vectors: Vec<Vec<f32>>, entries: Vec<ChunkMeta>) -> Result<Self> {
        if vectors.len() != entries.len() {
            return Err(Error::InvalidInput(format!(
                "{} vectors but {} metadata records", vectors.len(), entries.len()
            )));
        }
        let dim = vectors.first().map_or(0, Vec::len);
        if dim == 0 {
            return Err(Error::InvalidInput("vectors must be non-empty with dimension > 0".to_string()));
        }
        let mut data = Vec::with_capacity(dim * vectors.len());
        for (i, v) in vectors.into_iter().enumerate() {
            if v.len() != dim {
                return Err(Error::InvalidInput(format!("vector {i} has {} dims, expected {dim}", v.len())));
            }
            data.extend(v);
        }
        Ok(Self { dim, data, entries })
    }

    /// Reassembles an index from already flattened parts, as read from disk.
    pub(crate) fn from_parts(dim: usize, data: Vec<f32>, entries: Vec<ChunkMeta>) -> Result<Self> {
        if dim == 0 || data.len() != dim * entries.len() {
            return Err(Error::InvalidInput(format!(
                "{} floats do not form {} rows of {dim}", data.len(), entries.len()
            )));
        }
        Ok(Self { dim, data, entries })
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn entries(&self) -> &[ChunkMeta] { &self.entries }
    pub(crate) fn data(&self) -> &[f32] { &self.data }

    /// Top-`k` entries by inner product with `query`, best first. Equal scores
    /// keep ascending position order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(Error::InvalidInput("k must be >= 1".to_string()));
        }
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        let mut scored: Vec<(usize, f32)> = self
            .data
            .par_chunks(self.dim)
            .map(|row| dot(row, query))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| cmp_score(b.1, a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredChunk { score, position, meta: self.entries[position].clone() })
            .collect())
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// NaN sorts below every real score.
fn cmp_score(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
