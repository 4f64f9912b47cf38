use serde::{Deserialize, Serialize};
use sprs::{CsMat, CsVecView};
use std::cmp::Ordering;

use crate::error::{AppError, AppResult};

/// Neighbors returned per query: 50 neighbors plus the queried item itself
pub const DEFAULT_NEIGHBORS: usize = 51;

/// One query hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Cosine distance, `1 - cosine similarity`
    pub distance: f64,
    /// Item column of the hit
    pub column: usize,
}

/// Exact cosine nearest-neighbor search over item vectors
///
/// Keeps the full item matrix so every query is computed against the raw
/// vectors. Items are the columns of the user x item interaction matrix,
/// stored in CSC form so each item vector is one contiguous outer slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborIndex {
    item_vectors: CsMat<f64>,
    norms: Vec<f64>,
    n_neighbors: usize,
}

impl NeighborIndex {
    /// Fits the index over the columns of a user x item matrix
    pub fn fit(interactions: &CsMat<f64>, n_neighbors: usize) -> Self {
        let item_vectors = interactions.to_csc();
        let norms = (0..item_vectors.outer_dims())
            .map(|item| {
                item_vectors
                    .outer_view(item)
                    .map(|vector| l2_norm(vector.data()))
                    .unwrap_or(0.0)
            })
            .collect();

        Self {
            item_vectors,
            norms,
            n_neighbors,
        }
    }

    pub fn n_items(&self) -> usize {
        self.norms.len()
    }

    /// Length of every item vector, the number of users the index was fit on
    pub fn n_users(&self) -> usize {
        self.item_vectors.inner_dims()
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// The stored vector of an item column
    pub fn item_vector(&self, column: usize) -> Option<CsVecView<'_, f64>> {
        if column >= self.n_items() {
            return None;
        }
        self.item_vectors.outer_view(column)
    }

    /// Nearest items to `vector`, ascending by distance, ties by column
    ///
    /// Returns `min(n_items, n_neighbors)` hits. A zero query vector is at
    /// distance 1 from everything. The vector must span the same users as the
    /// item vectors.
    pub fn query(&self, vector: CsVecView<'_, f64>) -> AppResult<Vec<Neighbor>> {
        if vector.dim() != self.n_users() {
            return Err(AppError::Internal(format!(
                "query vector has dimension {} but items span {} users",
                vector.dim(),
                self.n_users()
            )));
        }
        let query_norm = l2_norm(vector.data());

        let mut hits: Vec<Neighbor> = (0..self.n_items())
            .map(|column| {
                let similarity = match self.item_vectors.outer_view(column) {
                    Some(item) if query_norm > 0.0 && self.norms[column] > 0.0 => {
                        vector.dot(&item) / (query_norm * self.norms[column])
                    }
                    _ => 0.0,
                };
                Neighbor {
                    distance: (1.0 - similarity).max(0.0),
                    column,
                }
            })
            .collect();

        let k = self.n_neighbors.min(hits.len());
        if k < hits.len() {
            hits.select_nth_unstable_by(k, compare_hits);
            hits.truncate(k);
        }
        hits.sort_unstable_by(compare_hits);
        Ok(hits)
    }

    /// Queries with the stored vector of `column`
    pub fn query_item(&self, column: usize) -> AppResult<Vec<Neighbor>> {
        let vector = self.item_vector(column).ok_or_else(|| {
            AppError::Internal(format!(
                "item column {} out of range for {} items",
                column,
                self.n_items()
            ))
        })?;
        self.query(vector)
    }

    /// Checks internal consistency after deserialization
    pub fn validate(&self) -> AppResult<()> {
        if self.item_vectors.outer_dims() != self.norms.len() {
            return Err(AppError::Snapshot(format!(
                "neighbor index has {} item vectors but {} norms",
                self.item_vectors.outer_dims(),
                self.norms.len()
            )));
        }
        if !self.item_vectors.is_csc() {
            return Err(AppError::Snapshot(
                "neighbor index item matrix must be column-major".to_string(),
            ));
        }
        if self.n_neighbors == 0 {
            return Err(AppError::Snapshot(
                "neighbor index must return at least one neighbor".to_string(),
            ));
        }
        Ok(())
    }
}

fn compare_hits(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.column.cmp(&b.column))
}

fn l2_norm(data: &[f64]) -> f64 {
    data.iter().map(|v| v * v).sum::<f64>().sqrt()
}
