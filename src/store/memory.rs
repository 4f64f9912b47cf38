use std::collections::HashMap;

use crate::{
    error::AppResult,
    models::{Movie, MovieId, Rating, UserId, UserRating},
};

use super::RatingsStore;

/// Vector-backed store; insertion order stands in for recency
#[derive(Debug, Clone, Default)]
pub struct InMemoryRatingsStore {
    ratings: Vec<Rating>,
    titles: HashMap<MovieId, String>,
}

impl InMemoryRatingsStore {
    pub fn new(ratings: Vec<Rating>, movies: Vec<Movie>) -> Self {
        let titles = movies.into_iter().map(|m| (m.movie_id, m.title)).collect();
        Self { ratings, titles }
    }
}

#[async_trait::async_trait]
impl RatingsStore for InMemoryRatingsStore {
    async fn ratings_for_user(&self, user_id: UserId) -> AppResult<Vec<UserRating>> {
        let mut rows: Vec<(usize, UserRating)> = self
            .ratings
            .iter()
            .enumerate()
            .filter(|(_, r)| r.user_id == user_id)
            .map(|(pos, r)| (pos, UserRating::new(r.movie_id, r.rating)))
            .collect();

        rows.sort_by(|(a_pos, a), (b_pos, b)| {
            b.rating.total_cmp(&a.rating).then_with(|| b_pos.cmp(a_pos))
        });

        Ok(rows.into_iter().map(|(_, r)| r).collect())
    }

    async fn all_ratings(&self) -> AppResult<Vec<Rating>> {
        Ok(self.ratings.clone())
    }

    async fn titles_for(&self, movie_ids: &[MovieId]) -> AppResult<HashMap<MovieId, String>> {
        Ok(movie_ids
            .iter()
            .filter_map(|id| self.titles.get(id).map(|title| (*id, title.clone())))
            .collect())
    }
}
