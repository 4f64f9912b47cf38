//! Read access to ratings and movie metadata
//!
//! Implementations must be safe to share across concurrent requests; each call
//! uses its own connection or session.

use std::collections::HashMap;

use crate::{
    error::AppResult,
    models::{MovieId, Rating, UserId, UserRating},
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRatingsStore;
pub use postgres::PgRatingsStore;

/// Ratings and movie metadata source
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingsStore: Send + Sync {
    /// A user's ratings, highest rating first, most recent first among equal ratings
    ///
    /// An unknown user yields an empty list.
    async fn ratings_for_user(&self, user_id: UserId) -> AppResult<Vec<UserRating>>;

    /// Every rating, for training
    async fn all_ratings(&self) -> AppResult<Vec<Rating>>;

    /// Titles of the given movies; ids without metadata are absent from the map
    async fn titles_for(&self, movie_ids: &[MovieId]) -> AppResult<HashMap<MovieId, String>>;
}
