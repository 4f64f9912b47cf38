//! Movie recommendations from item-based collaborative filtering.
//!
//! An offline job builds a [`services::ModelSnapshot`] from every rating in the
//! store: a cosine nearest-neighbor index over liked-interaction item vectors
//! and a popularity ranking. The HTTP service loads one snapshot, answers
//! requests by summing neighbor votes from a user's liked movies, and fills
//! short lists from the popularity ranking. Retraining swaps in a new snapshot
//! without disturbing requests already running.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
