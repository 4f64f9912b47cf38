use serde::{Deserialize, Serialize};

/// MovieLens user identifier
pub type UserId = i64;

/// MovieLens movie identifier
pub type MovieId = i64;

/// Ratings at or above this value count as positive feedback ("liked")
pub const LIKED_THRESHOLD: f64 = 3.5;

/// A single rating as stored in the ratings table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub rating: f64,
}

impl Rating {
    pub fn new(user_id: UserId, movie_id: MovieId, rating: f64) -> Self {
        Self {
            user_id,
            movie_id,
            rating,
        }
    }

    /// Whether this rating is a positive interaction
    pub fn is_liked(&self) -> bool {
        self.rating >= LIKED_THRESHOLD
    }
}

/// One of a user's ratings, as returned by a per-user lookup
///
/// The store returns these ordered by rating descending, then most recent first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRating {
    pub movie_id: MovieId,
    pub rating: f64,
}

impl UserRating {
    pub fn new(movie_id: MovieId, rating: f64) -> Self {
        Self { movie_id, rating }
    }
}

/// A movie row from the metadata table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Movie {
    pub movie_id: MovieId,
    pub title: String,
}
