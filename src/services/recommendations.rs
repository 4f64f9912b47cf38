use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    error::{AppError, AppResult},
    models::{MovieId, UserId, UserRating},
    services::{
        matrix::ItemIndex,
        neighbors::Neighbor,
        snapshot::{ModelHandle, ModelSnapshot},
    },
    store::RatingsStore,
};

/// Most liked movies used to seed one request
pub const MAX_SEEDS: usize = 20;

/// Recommendation count when the caller does not ask for one
pub const DEFAULT_TOP_K: i64 = 10;

/// Answers recommendation requests against the published model snapshot
///
/// Each request holds the snapshot it started with until it returns, so a
/// concurrent retrain never changes a result halfway through.
pub struct RecommendationEngine {
    store: Arc<dyn RatingsStore>,
    model: ModelHandle,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn RatingsStore>, model: ModelHandle) -> Self {
        Self { store, model }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Titles recommended for `user_id`, best first, at most `top_k` of them
    ///
    /// Users without liked ratings, including unknown users, get the
    /// popularity list. Movies whose title cannot be resolved are dropped.
    #[tracing::instrument(skip(self))]
    pub async fn recommend(&self, user_id: UserId, top_k: i64) -> AppResult<Vec<String>> {
        let top_k = validate_top_k(top_k)?;
        let snapshot = self.model.current();

        let ratings = self.store.ratings_for_user(user_id).await?;
        let movie_ids = recommend_movie_ids(&snapshot, &ratings, top_k)?;

        if movie_ids.is_empty() {
            return Ok(Vec::new());
        }

        let titles = self.store.titles_for(&movie_ids).await?;
        let resolved: Vec<String> = movie_ids
            .iter()
            .filter_map(|id| titles.get(id).cloned())
            .collect();

        if resolved.len() < movie_ids.len() {
            tracing::warn!(
                dropped = movie_ids.len() - resolved.len(),
                "Recommended movies without a title were dropped"
            );
        }

        Ok(resolved)
    }
}

/// Rejects non-positive counts before any work is done
pub fn validate_top_k(top_k: i64) -> AppResult<usize> {
    if top_k <= 0 {
        return Err(AppError::InvalidInput(format!(
            "top_k must be a positive integer, got {}",
            top_k
        )));
    }
    usize::try_from(top_k)
        .map_err(|_| AppError::InvalidInput(format!("top_k is too large: {}", top_k)))
}

/// Ranked movie ids for a user's ratings against one snapshot
pub fn recommend_movie_ids(
    snapshot: &ModelSnapshot,
    ratings: &[UserRating],
    top_k: usize,
) -> AppResult<Vec<MovieId>> {
    let seeds = select_seeds(ratings, snapshot.liked_threshold);

    let ranked = score_candidates(&seeds, &snapshot.items, |column| {
        snapshot.neighbors.query_item(column)
    })?;

    tracing::debug!(
        seeds = seeds.len(),
        candidates = ranked.len(),
        "Neighbor candidates scored"
    );

    Ok(merge_with_popularity(ranked, &snapshot.popularity, &seeds, top_k))
}

/// The user's liked movies in store order, capped at [`MAX_SEEDS`]
///
/// `ratings` is expected highest rating first, most recent first among ties.
/// A movie liked more than once keeps every occurrence: each one takes a slot
/// under the cap and votes on its own.
pub fn select_seeds(ratings: &[UserRating], liked_threshold: f64) -> Vec<MovieId> {
    ratings
        .iter()
        .filter(|r| r.rating >= liked_threshold)
        .map(|r| r.movie_id)
        .take(MAX_SEEDS)
        .collect()
}

/// Accumulates neighbor votes from every seed and ranks the candidates
///
/// Each seed present in `items` is looked up through `neighbors`. A hit on
/// another item adds `1 - distance` to that item's score. Seeds never appear
/// in the output. Candidates are ordered by score descending, then movie id
/// ascending.
pub fn score_candidates<F>(
    seeds: &[MovieId],
    items: &ItemIndex,
    mut neighbors: F,
) -> AppResult<Vec<MovieId>>
where
    F: FnMut(usize) -> AppResult<Vec<Neighbor>>,
{
    let mut scores: HashMap<MovieId, f64> = HashMap::new();

    for &seed in seeds {
        let Some(column) = items.position(seed) else {
            continue;
        };

        for hit in neighbors(column)? {
            if hit.column == column {
                continue;
            }
            let Some(candidate) = items.id_at(hit.column) else {
                continue;
            };
            *scores.entry(candidate).or_insert(0.0) += 1.0 - hit.distance;
        }
    }

    let liked: HashSet<MovieId> = seeds.iter().copied().collect();
    scores.retain(|id, _| !liked.contains(id));

    let mut ranked: Vec<(MovieId, f64)> = scores.into_iter().collect();
    ranked.sort_unstable_by(|(a_id, a_score), (b_id, b_score)| {
        b_score.total_cmp(a_score).then_with(|| a_id.cmp(b_id))
    });

    Ok(ranked.into_iter().map(|(id, _)| id).collect())
}

/// Tops up the neighbor ranking from the popularity list and truncates
///
/// Popular movies are appended in order, skipping seeds and movies already
/// ranked, only while fewer than `top_k` candidates are available.
pub fn merge_with_popularity(
    mut ranked: Vec<MovieId>,
    popularity: &[MovieId],
    seeds: &[MovieId],
    top_k: usize,
) -> Vec<MovieId> {
    if ranked.len() < top_k {
        let mut excluded: HashSet<MovieId> = ranked.iter().chain(seeds).copied().collect();
        let fill: Vec<MovieId> = popularity
            .iter()
            .copied()
            .filter(|id| excluded.insert(*id))
            .take(top_k - ranked.len())
            .collect();

        tracing::debug!(fallback = fill.len(), "Popularity fallback applied");
        ranked.extend(fill);
    }

    ranked.truncate(top_k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Movie, Rating},
        services::training::train_model,
        store::{InMemoryRatingsStore, MockRatingsStore},
    };

    fn hit(distance: f64, column: usize) -> Neighbor {
        Neighbor { distance, column }
    }

    #[test]
    fn test_neighbor_votes_accumulate_across_seeds() {
        // Liked movies 10 and 20 sit in columns 0 and 1; column 5 is movie 60
        let items = ItemIndex::from_ids(vec![10, 20, 30, 40, 50, 60]);
        let seeds = vec![10, 20];

        let ranked = score_candidates(&seeds, &items, |column| {
            Ok(match column {
                0 => vec![hit(0.0, 0), hit(0.1, 5), hit(0.3, 1)],
                1 => vec![hit(0.0, 1), hit(0.05, 5), hit(0.4, 0)],
                _ => unreachable!(),
            })
        })
        .unwrap();

        assert_eq!(ranked, vec![60]);

        let popularity = vec![10, 70, 60, 80, 90];
        let merged = merge_with_popularity(ranked, &popularity, &seeds, 3);
        assert_eq!(merged, vec![60, 70, 80]);
    }

    #[test]
    fn test_scores_sum_and_rank_with_id_tie_break() {
        let items = ItemIndex::from_ids(vec![1, 2, 3, 4]);
        let mut calls = Vec::new();

        let ranked = score_candidates(&[1, 2], &items, |column| {
            calls.push(column);
            Ok(match column {
                // movie 1: votes 0.5 for movie 4 and 0.25 for movie 3
                0 => vec![hit(0.0, 0), hit(0.5, 3), hit(0.75, 2)],
                // movie 2: votes another 0.25 for movie 3
                1 => vec![hit(0.0, 1), hit(0.75, 2)],
                _ => unreachable!(),
            })
        })
        .unwrap();

        // movies 3 and 4 both score 0.5; the lower id wins
        assert_eq!(ranked, vec![3, 4]);
        assert_eq!(calls, vec![0, 1]);
    }

    #[test]
    fn test_seeds_missing_from_index_are_skipped() {
        let items = ItemIndex::from_ids(vec![1, 2]);
        let ranked = score_candidates(&[99], &items, |_| unreachable!()).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_seed_selection_keeps_order_and_caps() {
        let mut ratings = vec![
            UserRating::new(5, 5.0),
            UserRating::new(6, 4.0),
            UserRating::new(5, 4.0),
            UserRating::new(7, 3.0),
        ];
        assert_eq!(select_seeds(&ratings, 3.5), vec![5, 6, 5]);

        ratings = (0..30).map(|id| UserRating::new(id, 4.5)).collect();
        let seeds = select_seeds(&ratings, 3.5);
        assert_eq!(seeds.len(), MAX_SEEDS);
        assert_eq!(seeds, (0..20).collect::<Vec<MovieId>>());
    }

    #[test]
    fn test_repeated_like_takes_a_seed_slot_and_votes_twice() {
        let mut ratings = vec![UserRating::new(1, 5.0), UserRating::new(1, 5.0)];
        ratings.extend((2..=21).map(|id| UserRating::new(id, 4.0)));

        let seeds = select_seeds(&ratings, 3.5);

        assert_eq!(seeds.len(), MAX_SEEDS);
        assert_eq!(&seeds[..2], &[1, 1]);
        assert_eq!(seeds.last(), Some(&19));
        assert!(!seeds.contains(&20));

        // Movie 1 (column 0) votes 0.5 for movie 30 once per occurrence;
        // movie 2 (column 1) votes 0.75 for movie 40 once
        let items = ItemIndex::from_ids(vec![1, 2, 30, 40]);
        let ranked = score_candidates(&[1, 1, 2], &items, |column| {
            Ok(match column {
                0 => vec![hit(0.0, 0), hit(0.5, 2)],
                1 => vec![hit(0.0, 1), hit(0.25, 3)],
                _ => unreachable!(),
            })
        })
        .unwrap();

        // 1.0 for movie 30 beats 0.75 for movie 40
        assert_eq!(ranked, vec![30, 40]);
    }

    #[test]
    fn test_merge_does_not_pad_a_full_ranking() {
        let merged = merge_with_popularity(vec![3, 1, 2], &[9, 8], &[], 2);
        assert_eq!(merged, vec![3, 1]);
    }

    #[test]
    fn test_merge_with_nothing_available_is_empty() {
        assert!(merge_with_popularity(vec![], &[], &[1], 5).is_empty());
    }

    #[test]
    fn test_validate_top_k() {
        assert_eq!(validate_top_k(10).unwrap(), 10);
        assert!(matches!(validate_top_k(0), Err(AppError::InvalidInput(_))));
        assert!(matches!(validate_top_k(-3), Err(AppError::InvalidInput(_))));
    }

    /// Two taste clusters: {1, 2, 3} and {4, 5}, with movie 6 rated often but disliked
    fn catalog() -> (Vec<Rating>, Vec<Movie>) {
        let ratings = vec![
            Rating::new(1, 1, 5.0),
            Rating::new(1, 2, 4.5),
            Rating::new(1, 3, 4.0),
            Rating::new(2, 1, 4.0),
            Rating::new(2, 2, 4.0),
            Rating::new(3, 2, 5.0),
            Rating::new(3, 3, 4.0),
            Rating::new(4, 4, 5.0),
            Rating::new(4, 5, 4.0),
            Rating::new(5, 4, 4.0),
            Rating::new(5, 5, 4.5),
            Rating::new(1, 6, 1.0),
            Rating::new(2, 6, 1.0),
            Rating::new(3, 6, 2.0),
            Rating::new(4, 6, 0.5),
            Rating::new(5, 6, 1.5),
            Rating::new(9, 1, 2.0),
        ];
        let movies = (1..=6)
            .map(|id| Movie {
                movie_id: id,
                title: format!("Movie {}", id),
            })
            .collect();
        (ratings, movies)
    }

    fn engine_for(ratings: Vec<Rating>, movies: Vec<Movie>) -> RecommendationEngine {
        let snapshot = train_model(&ratings).unwrap();
        let store = InMemoryRatingsStore::new(ratings, movies);
        RecommendationEngine::new(Arc::new(store), ModelHandle::new(snapshot))
    }

    #[tokio::test]
    async fn test_recommends_from_the_same_cluster_first() {
        let (ratings, movies) = catalog();
        let mut request = ratings.clone();
        // User 10 likes only movie 1
        request.push(Rating::new(10, 1, 5.0));
        let engine = engine_for(request, movies);

        let titles = engine.recommend(10, 3).await.unwrap();

        // 2 and 3 share users with 1; 4 and 5 are orthogonal and score zero
        assert_eq!(titles, vec!["Movie 2", "Movie 3", "Movie 4"]);
    }

    #[tokio::test]
    async fn test_cold_start_is_pure_popularity() {
        let (ratings, movies) = catalog();
        let engine = engine_for(ratings, movies);
        let expected: Vec<String> = engine.model().current().popularity[..4]
            .iter()
            .map(|id| format!("Movie {}", id))
            .collect();

        assert_eq!(engine.recommend(404, 4).await.unwrap(), expected);
        // User 9 only has a disliked rating
        assert_eq!(engine.recommend(9, 4).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_results_exclude_liked_and_have_no_duplicates() {
        let (ratings, movies) = catalog();
        let engine = engine_for(ratings, movies);

        for top_k in 1..=8 {
            let titles = engine.recommend(1, top_k).await.unwrap();
            let unique: HashSet<&String> = titles.iter().collect();

            assert_eq!(unique.len(), titles.len());
            for liked in ["Movie 1", "Movie 2", "Movie 3"] {
                assert!(!titles.iter().any(|t| t == liked));
            }
            // Only 4, 5 and 6 are left to recommend
            assert_eq!(titles.len(), (top_k as usize).min(3));
        }
    }

    #[tokio::test]
    async fn test_recommendations_are_deterministic() {
        let (ratings, movies) = catalog();
        let engine = engine_for(ratings, movies);

        let first = engine.recommend(2, 5).await.unwrap();
        let second = engine.recommend(2, 5).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unresolvable_titles_are_dropped() {
        let (ratings, movies) = catalog();
        let movies: Vec<Movie> = movies.into_iter().filter(|m| m.movie_id != 6).collect();
        let engine = engine_for(ratings, movies);

        let titles = engine.recommend(404, 3).await.unwrap();
        assert_eq!(titles.len(), 2);
        assert!(!titles.iter().any(|t| t == "Movie 6"));
    }

    #[tokio::test]
    async fn test_invalid_top_k_skips_the_store() {
        let (ratings, _) = catalog();
        let snapshot = train_model(&ratings).unwrap();
        let mut store = MockRatingsStore::new();
        store.expect_ratings_for_user().never();
        let engine = RecommendationEngine::new(Arc::new(store), ModelHandle::new(snapshot));

        let result = engine.recommend(1, 0).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let (ratings, _) = catalog();
        let snapshot = train_model(&ratings).unwrap();
        let mut store = MockRatingsStore::new();
        store
            .expect_ratings_for_user()
            .returning(|_| Err(AppError::QueryFailure(sqlx::Error::PoolTimedOut)));
        store.expect_titles_for().never();
        let engine = RecommendationEngine::new(Arc::new(store), ModelHandle::new(snapshot));

        let result = engine.recommend(1, 5).await;
        assert!(matches!(result, Err(AppError::QueryFailure(_))));
    }

    #[tokio::test]
    async fn test_empty_result_skips_title_lookup() {
        let snapshot = train_model(&[Rating::new(1, 1, 5.0)]).unwrap();
        let mut store = MockRatingsStore::new();
        store
            .expect_ratings_for_user()
            .returning(|_| Ok(vec![UserRating::new(1, 5.0)]));
        store.expect_titles_for().never();
        let engine = RecommendationEngine::new(Arc::new(store), ModelHandle::new(snapshot));

        // The only movie is liked, so nothing is left
        assert!(engine.recommend(1, 5).await.unwrap().is_empty());
    }
}
