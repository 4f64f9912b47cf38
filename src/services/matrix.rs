use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    models::Rating,
};

/// Bijection between external ids and dense zero-based positions
///
/// Ids are kept sorted ascending, so position order always follows id order.
/// Serialized as the plain sorted id list; the reverse map is rebuilt on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct IdIndex {
    ids: Vec<i64>,
    positions: HashMap<i64, usize>,
}

/// Row index of the interaction matrix
pub type UserIndex = IdIndex;

/// Column index of the interaction matrix
pub type ItemIndex = IdIndex;

impl IdIndex {
    /// Builds an index over the distinct values of `ids`
    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut ids: Vec<i64> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let positions = ids.iter().enumerate().map(|(pos, &id)| (id, pos)).collect();
        Self { ids, positions }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Dense position for an id, if the id was indexed
    pub fn position(&self, id: i64) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Id stored at a dense position
    pub fn id_at(&self, position: usize) -> Option<i64> {
        self.ids.get(position).copied()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }
}

impl TryFrom<Vec<i64>> for IdIndex {
    type Error = String;

    fn try_from(ids: Vec<i64>) -> Result<Self, Self::Error> {
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(format!(
                "index ids must be strictly ascending, found {} before {}",
                pair[0], pair[1]
            ));
        }
        Ok(Self::from_ids(ids))
    }
}

impl From<IdIndex> for Vec<i64> {
    fn from(index: IdIndex) -> Self {
        index.ids
    }
}

/// Sparse user x item matrix of liked interactions plus its id mappings
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    /// Rows are users, columns are items, stored as CSR
    pub matrix: CsMat<f64>,
    pub users: UserIndex,
    pub items: ItemIndex,
}

impl InteractionMatrix {
    /// (users, items)
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }
}

/// Builds the interaction matrix from the full rating set
///
/// Only liked ratings contribute. Each one adds a weight of 1.0 to its
/// (user, item) cell, so repeated likes of the same movie by the same user
/// sum rather than collapse.
pub fn build_interactions(ratings: &[Rating]) -> AppResult<InteractionMatrix> {
    let liked: Vec<&Rating> = ratings.iter().filter(|r| r.is_liked()).collect();

    if liked.is_empty() {
        return Err(AppError::Data(
            "No liked ratings available to build the interaction matrix".to_string(),
        ));
    }

    let users = UserIndex::from_ids(liked.iter().map(|r| r.user_id));
    let items = ItemIndex::from_ids(liked.iter().map(|r| r.movie_id));

    let mut triplets = TriMat::with_capacity((users.len(), items.len()), liked.len());
    for rating in &liked {
        let row = position_of(&users, rating.user_id)?;
        let col = position_of(&items, rating.movie_id)?;
        triplets.add_triplet(row, col, 1.0);
    }

    // Duplicate triplets are summed during compression
    let matrix: CsMat<f64> = triplets.to_csr();

    tracing::debug!(
        liked = liked.len(),
        users = users.len(),
        items = items.len(),
        nnz = matrix.nnz(),
        "Interaction matrix built"
    );

    Ok(InteractionMatrix {
        matrix,
        users,
        items,
    })
}

fn position_of(index: &IdIndex, id: i64) -> AppResult<usize> {
    index
        .position(id)
        .ok_or_else(|| AppError::Internal(format!("id {} missing from its own index", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratings() -> Vec<Rating> {
        vec![
            Rating::new(7, 300, 4.0),
            Rating::new(3, 100, 5.0),
            Rating::new(3, 200, 2.0),
            Rating::new(5, 200, 3.5),
            Rating::new(7, 100, 1.0),
        ]
    }

    #[test]
    fn test_index_is_sorted_and_dense() {
        let index = IdIndex::from_ids(vec![30, 10, 20, 10]);
        assert_eq!(index.ids(), &[10, 20, 30]);
        assert_eq!(index.position(10), Some(0));
        assert_eq!(index.position(30), Some(2));
        assert_eq!(index.position(99), None);
        assert_eq!(index.id_at(1), Some(20));
        assert_eq!(index.id_at(3), None);
    }

    #[test]
    fn test_index_rejects_unsorted_ids_on_deserialize() {
        let result: Result<IdIndex, _> = serde_json::from_str("[3, 1, 2]");
        assert!(result.is_err());

        let duplicate: Result<IdIndex, _> = serde_json::from_str("[1, 1]");
        assert!(duplicate.is_err());

        let index: IdIndex = serde_json::from_str("[1, 2, 5]").unwrap();
        assert_eq!(index.position(5), Some(2));
    }

    #[test]
    fn test_only_liked_ratings_are_indexed() {
        let interactions = build_interactions(&ratings()).unwrap();

        // User 3 rated 200 with 2.0 and user 7 rated 100 with 1.0; neither counts
        assert_eq!(interactions.users.ids(), &[3, 5, 7]);
        assert_eq!(interactions.items.ids(), &[100, 200, 300]);
        assert_eq!(interactions.shape(), (3, 3));
        assert_eq!(interactions.nnz(), 3);

        assert_eq!(interactions.matrix.get(0, 0), Some(&1.0));
        assert_eq!(interactions.matrix.get(1, 1), Some(&1.0));
        assert_eq!(interactions.matrix.get(2, 2), Some(&1.0));
        assert_eq!(interactions.matrix.get(0, 1), None);
    }

    #[test]
    fn test_duplicate_likes_are_summed() {
        let ratings = vec![
            Rating::new(1, 10, 4.0),
            Rating::new(1, 10, 5.0),
            Rating::new(2, 10, 4.5),
        ];
        let interactions = build_interactions(&ratings).unwrap();

        assert_eq!(interactions.nnz(), 2);
        assert_eq!(interactions.matrix.get(0, 0), Some(&2.0));
        assert_eq!(interactions.matrix.get(1, 0), Some(&1.0));
    }

    #[test]
    fn test_empty_liked_subset_is_rejected() {
        let ratings = vec![Rating::new(1, 10, 2.0), Rating::new(2, 20, 3.0)];
        assert!(matches!(build_interactions(&ratings), Err(AppError::Data(_))));
        assert!(matches!(build_interactions(&[]), Err(AppError::Data(_))));
    }
}
