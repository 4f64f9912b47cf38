use std::collections::HashMap;

use crate::models::{MovieId, Rating};

/// Length cap of the popularity fallback list
pub const POPULARITY_LIMIT: usize = 2000;

/// Orders movies by how many ratings they received, across all ratings
///
/// Every rating counts regardless of its value. Equal counts are ordered by
/// ascending movie id. The result holds at most `limit` entries.
pub fn rank_by_popularity(ratings: &[Rating], limit: usize) -> Vec<MovieId> {
    let mut counts: HashMap<MovieId, usize> = HashMap::new();
    for rating in ratings {
        *counts.entry(rating.movie_id).or_insert(0) += 1;
    }

    let mut ranked: Vec<(MovieId, usize)> = counts.into_iter().collect();
    ranked.sort_unstable_by(|(a_id, a_count), (b_id, b_count)| {
        b_count.cmp(a_count).then_with(|| a_id.cmp(b_id))
    });
    ranked.truncate(limit);

    ranked.into_iter().map(|(movie_id, _)| movie_id).collect()
}
