// Gap detection for movie collections and TV episodes

pub mod episodes;
pub mod movies;

use async_trait::async_trait;

use crate::models::{CollectionRecord, CollectionRef, SeriesEpisodeList};
use crate::services::tmdb::TmdbClient;
use crate::services::tvdb::TvdbClient;
use crate::services::CatalogError;

/// Seam between the movie gap engine and TMDB, so the engine can be
/// exercised against an in-memory catalog in tests.
#[async_trait]
pub trait MovieCatalog: Send + Sync {
    async fn movie_collection(&self, movie_id: i64) -> Result<Option<CollectionRef>, CatalogError>;
    async fn collection(&self, collection_id: i64) -> Result<CollectionRecord, CatalogError>;
}

/// Seam between the episode gap engine and TVDB.
#[async_trait]
pub trait EpisodeCatalog: Send + Sync {
    async fn series_episodes(&self, series_id: i64) -> Result<SeriesEpisodeList, CatalogError>;
}

#[async_trait]
impl MovieCatalog for TmdbClient {
    async fn movie_collection(&self, movie_id: i64) -> Result<Option<CollectionRef>, CatalogError> {
        TmdbClient::movie_collection(self, movie_id).await
    }

    async fn collection(&self, collection_id: i64) -> Result<CollectionRecord, CatalogError> {
        TmdbClient::collection(self, collection_id).await
    }
}

#[async_trait]
impl EpisodeCatalog for TvdbClient {
    async fn series_episodes(&self, series_id: i64) -> Result<SeriesEpisodeList, CatalogError> {
        TvdbClient::series_episodes(self, series_id).await
    }
}

/// Progress callback: (stage, current, total).
pub type ProgressFn = dyn Fn(&str, u64, u64) + Send + Sync;

/// How many catalog lookups run concurrently within one phase. Results
/// are re-sorted before grouping, so this never affects report order.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Case-insensitive name match against a configured exclusion list.
pub(crate) fn is_excluded(name: &str, exclusions: &[String]) -> bool {
    exclusions.iter().any(|e| e.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_match_is_case_insensitive() {
        let exclusions = vec!["Daily Talk Show".to_string()];
        assert!(is_excluded("daily talk show", &exclusions));
        assert!(is_excluded("Daily Talk Show", &exclusions));
        assert!(!is_excluded("Other Show", &exclusions));
    }
}
