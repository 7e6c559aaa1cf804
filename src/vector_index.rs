//! Flat inner-product vector index.
//!
//! Vectors are stored row-major in one contiguous buffer and scored by
//! exhaustive dot product, parallelized across rows. Over pre-normalized
//! vectors the inner product equals cosine similarity. Exact by
//! construction; the filtered-search strategies in the retriever decide
//! when to build temporary sub-indexes from slices of this one.

use rayon::prelude::*;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn from_rows(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(Error::Corrupt(format!(
                "vector blob of {} floats is not a multiple of dim {dim}",
                data.len()
            )));
        }
        Ok(Self { dim, data })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Append one vector. The caller guarantees the dimension matches.
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::Config(format!(
                "cannot add vector of dim {} to index of dim {}",
                vector.len(),
                self.dim
            )));
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// The stored vector at `position`.
    pub fn reconstruct(&self, position: usize) -> &[f32] {
        let start = position * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Exact top-k by inner product over the whole index.
    ///
    /// Returns (position, score) pairs, best first. Ties break towards the
    /// lower position so results are fully deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let total = self.len();
        if k == 0 || total == 0 {
            return vec![];
        }

        let mut scored: Vec<(usize, f32)> = (0..total)
            .into_par_iter()
            .map(|i| (i, dot(self.reconstruct(i), query)))
            .collect();

        scored.sort_unstable_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k.min(total));
        scored
    }

    /// Build a detached exact index from a subset of rows, in the given
    /// order; position `i` of the result corresponds to `positions[i]`.
    pub fn subset(&self, positions: &[usize]) -> Self {
        let mut data = Vec::with_capacity(positions.len() * self.dim);
        for &pos in positions {
            data.extend_from_slice(self.reconstruct(pos));
        }
        Self {
            dim: self.dim,
            data,
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_index() -> FlatIpIndex {
        let mut index = FlatIpIndex::new(3);
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0, 0.0]).unwrap();
        index.add(&[0.0, 0.0, 1.0]).unwrap();
        index.add(&[0.6, 0.8, 0.0]).unwrap();
        index
    }

    #[test]
    fn search_orders_by_inner_product() {
        let index = unit_index();
        let results = index.search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(results[0].0, 0);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(results[1].0, 3);
        assert!((results[1].1 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn search_k_larger_than_store() {
        let index = unit_index();
        let results = index.search(&[0.0, 1.0, 0.0], 100);
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn search_empty_or_zero_k() {
        let index = FlatIpIndex::new(3);
        assert!(index.search(&[1.0, 0.0, 0.0], 5).is_empty());
        let index = unit_index();
        assert!(index.search(&[1.0, 0.0, 0.0], 0).is_empty());
    }

    #[test]
    fn ties_break_to_lower_position() {
        let mut index = FlatIpIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[1.0, 0.0]).unwrap();
        let results = index.search(&[1.0, 0.0], 2);
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
    }

    #[test]
    fn subset_maps_positions() {
        let index = unit_index();
        let sub = index.subset(&[3, 1]);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.reconstruct(0), &[0.6, 0.8, 0.0]);
        assert_eq!(sub.reconstruct(1), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn from_rows_rejects_ragged_blob() {
        assert!(FlatIpIndex::from_rows(3, vec![1.0, 2.0]).is_err());
        assert!(FlatIpIndex::from_rows(2, vec![1.0, 2.0, 3.0, 4.0]).is_ok());
    }

    #[test]
    fn add_rejects_wrong_dimension() {
        let mut index = FlatIpIndex::new(3);
        assert!(index.add(&[1.0, 0.0]).is_err());
    }
}
