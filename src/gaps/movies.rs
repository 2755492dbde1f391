// Movie collection gap detection.
//
// For each distinct collection touched by an owned movie, fetch the
// authoritative member list and diff it against the owned set. Lookups
// run through a bounded worker pool; results are re-sorted by collection
// name before grouping so concurrency never changes the report.

use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

use crate::models::{
    CollectionGap, CollectionMovie, CollectionRecord, MissingMovie, MovieGapReport, MovieSnapshot,
    SkippedTally,
};
use crate::services::CatalogError;

use super::{is_excluded, MovieCatalog, ProgressFn, DEFAULT_CONCURRENCY};

#[derive(Debug, Clone)]
pub struct MovieGapOptions {
    /// Include members with no release date or one in the future.
    pub include_future: bool,
    /// Collections with fewer total members than this are not reported.
    pub min_collection_size: usize,
    /// Collections where fewer than this many members are owned are not
    /// reported.
    pub min_owned: usize,
    /// Collection names to skip entirely.
    pub excluded_collections: Vec<String>,
    pub concurrency: usize,
}

impl Default for MovieGapOptions {
    fn default() -> Self {
        Self {
            include_future: false,
            min_collection_size: 2,
            min_owned: 1,
            excluded_collections: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

pub struct MovieGapFinder<'a, C: MovieCatalog + ?Sized> {
    catalog: &'a C,
    options: MovieGapOptions,
    cancel: CancellationToken,
    progress: Option<Box<ProgressFn>>,
}

impl<'a, C: MovieCatalog + ?Sized> MovieGapFinder<'a, C> {
    pub fn new(catalog: &'a C, options: MovieGapOptions) -> Self {
        Self {
            catalog,
            options,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Box<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report_progress(&self, stage: &str, current: u64, total: u64) {
        if let Some(cb) = &self.progress {
            cb(stage, current, total);
        }
    }

    /// Run the scan over an already-built library snapshot. Recoverable
    /// lookup failures skip the single movie and keep going; only a
    /// rejected credential aborts.
    pub async fn find_gaps(
        &self,
        library_name: &str,
        snapshot: &MovieSnapshot,
    ) -> Result<MovieGapReport, CatalogError> {
        let mut skipped = SkippedTally {
            no_external_id: snapshot.skipped_no_external_id,
            ..Default::default()
        };

        let owned_ids: HashSet<i64> = snapshot.movies.iter().map(|m| m.tmdb_id).collect();

        // Phase 1: resolve collection membership for every owned movie,
        // deduplicating to the set of distinct collections touched.
        let total = snapshot.movies.len() as u64;
        self.report_progress("Checking collection membership", 0, total);

        let catalog = self.catalog;
        let mut lookups = futures::stream::iter(snapshot.movies.iter().map(|movie| {
            let title = movie.title.clone();
            async move { (title, catalog.movie_collection(movie.tmdb_id).await) }
        }))
        .buffer_unordered(self.options.concurrency.max(1));

        let mut collections: HashMap<i64, String> = HashMap::new();
        let mut movies_in_collections = 0;
        let mut done = 0u64;
        let mut cancelled = self.cancel.is_cancelled();

        while !cancelled {
            let Some((title, result)) = lookups.next().await else {
                break;
            };
            done += 1;
            self.report_progress("Checking collection membership", done, total);
            match result {
                Ok(Some(collection)) => {
                    movies_in_collections += 1;
                    collections.insert(collection.id, collection.name);
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping '{}': collection lookup failed: {}", title, e);
                    skipped.lookup_failed += 1;
                }
            }
            cancelled = self.cancel.is_cancelled();
        }
        drop(lookups);

        let unique_collections = collections.len();

        // Phase 2: fetch the full member list of each distinct collection.
        let mut to_fetch: Vec<(i64, String)> = collections
            .into_iter()
            .filter(|(_, name)| {
                if is_excluded(name, &self.options.excluded_collections) {
                    tracing::info!("Collection excluded by configuration: {}", name);
                    skipped.excluded += 1;
                    false
                } else {
                    true
                }
            })
            .collect();
        to_fetch.sort_by(|a, b| a.1.cmp(&b.1));

        let total = to_fetch.len() as u64;
        self.report_progress("Fetching collections", 0, total);

        let mut fetches = futures::stream::iter(to_fetch.iter().map(|(id, name)| {
            let name = name.clone();
            let id = *id;
            async move { (name, catalog.collection(id).await) }
        }))
        .buffer_unordered(self.options.concurrency.max(1));

        let mut records: Vec<CollectionRecord> = Vec::new();
        let mut done = 0u64;

        while !cancelled {
            let Some((name, result)) = fetches.next().await else {
                break;
            };
            done += 1;
            self.report_progress("Fetching collections", done, total);
            match result {
                Ok(record) => records.push(record),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping collection '{}': fetch failed: {}", name, e);
                    skipped.lookup_failed += 1;
                }
            }
            cancelled = self.cancel.is_cancelled();
        }
        drop(fetches);

        // Phase 3: diff. Restore deterministic order regardless of how
        // the fetches completed.
        records.sort_by(|a, b| a.name.cmp(&b.name));
        let today = Utc::now().date_naive();

        let mut collections_with_gaps = Vec::new();
        for record in records {
            if record.movies.len() < self.options.min_collection_size {
                tracing::debug!(
                    "Collection '{}' below size floor ({} < {})",
                    record.name,
                    record.movies.len(),
                    self.options.min_collection_size
                );
                continue;
            }

            let owned_count = record
                .movies
                .iter()
                .filter(|m| owned_ids.contains(&m.tmdb_id))
                .count();
            if owned_count < self.options.min_owned {
                continue;
            }

            let mut missing: Vec<MissingMovie> = record
                .movies
                .iter()
                .filter(|m| self.is_missing(m, &owned_ids, today))
                .map(|m| MissingMovie {
                    tmdb_id: m.tmdb_id,
                    title: m.title.clone(),
                    year: m.year(),
                    release_date: m.release_date,
                })
                .collect();
            if missing.is_empty() {
                continue;
            }
            missing.sort_by_key(|m| (m.release_date.is_none(), m.release_date));

            collections_with_gaps.push(CollectionGap {
                collection_id: record.id,
                collection_name: record.name,
                total_movies: record.movies.len(),
                owned_movies: owned_count,
                missing_movies: missing,
            });
        }

        Ok(MovieGapReport {
            library_name: library_name.to_string(),
            movies_scanned: snapshot.scanned,
            movies_with_tmdb_id: snapshot.movies.len(),
            movies_in_collections,
            unique_collections,
            collections_with_gaps,
            skipped,
            cancelled,
        })
    }

    fn is_missing(&self, movie: &CollectionMovie, owned: &HashSet<i64>, today: NaiveDate) -> bool {
        if owned.contains(&movie.tmdb_id) {
            return false;
        }
        if self.options.include_future {
            return true;
        }
        // Undated members are treated as unreleased.
        matches!(movie.release_date, Some(date) if date <= today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionRef, OwnedMovie};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    /// In-memory catalog: movie id -> collection id, plus collections.
    struct FakeCatalog {
        memberships: HashMap<i64, i64>,
        collections: HashMap<i64, CollectionRecord>,
        failing_movies: Vec<i64>,
    }

    impl FakeCatalog {
        fn new() -> Self {
            Self {
                memberships: HashMap::new(),
                collections: HashMap::new(),
                failing_movies: Vec::new(),
            }
        }

        fn with_collection(mut self, id: i64, name: &str, members: &[(i64, &str, &str)]) -> Self {
            let movies = members
                .iter()
                .map(|(tmdb_id, title, date)| CollectionMovie {
                    tmdb_id: *tmdb_id,
                    title: title.to_string(),
                    release_date: if date.is_empty() {
                        None
                    } else {
                        Some(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap())
                    },
                })
                .collect();
            for (tmdb_id, _, _) in members {
                self.memberships.insert(*tmdb_id, id);
            }
            self.collections.insert(
                id,
                CollectionRecord {
                    id,
                    name: name.to_string(),
                    movies,
                },
            );
            self
        }
    }

    #[async_trait]
    impl MovieCatalog for FakeCatalog {
        async fn movie_collection(
            &self,
            movie_id: i64,
        ) -> Result<Option<CollectionRef>, CatalogError> {
            if self.failing_movies.contains(&movie_id) {
                return Err(CatalogError::Timeout);
            }
            Ok(self.memberships.get(&movie_id).map(|id| CollectionRef {
                id: *id,
                name: self.collections[id].name.clone(),
            }))
        }

        async fn collection(&self, collection_id: i64) -> Result<CollectionRecord, CatalogError> {
            self.collections
                .get(&collection_id)
                .cloned()
                .ok_or(CatalogError::NotFound)
        }
    }

    fn owned(ids: &[i64]) -> MovieSnapshot {
        MovieSnapshot {
            movies: ids
                .iter()
                .map(|id| OwnedMovie {
                    tmdb_id: *id,
                    title: format!("Movie {}", id),
                    year: None,
                })
                .collect(),
            scanned: ids.len(),
            skipped_no_external_id: 0,
        }
    }

    #[tokio::test]
    async fn test_empty_library() {
        let catalog = FakeCatalog::new();
        let finder = MovieGapFinder::new(&catalog, MovieGapOptions::default());
        let report = finder.find_gaps("Movies", &owned(&[])).await.unwrap();

        assert_eq!(report.movies_scanned, 0);
        assert!(report.collections_with_gaps.is_empty());
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_movies_without_collections() {
        let catalog = FakeCatalog::new();
        let finder = MovieGapFinder::new(&catalog, MovieGapOptions::default());
        let report = finder.find_gaps("Movies", &owned(&[100, 200])).await.unwrap();

        assert_eq!(report.movies_with_tmdb_id, 2);
        assert_eq!(report.movies_in_collections, 0);
        assert!(report.collections_with_gaps.is_empty());
    }

    #[tokio::test]
    async fn test_complete_collection_has_no_gap() {
        let catalog = FakeCatalog::new().with_collection(
            1,
            "Complete",
            &[(100, "One", "2020-01-01"), (101, "Two", "2021-01-01")],
        );
        let finder = MovieGapFinder::new(&catalog, MovieGapOptions::default());
        let report = finder.find_gaps("Movies", &owned(&[100, 101])).await.unwrap();

        assert_eq!(report.unique_collections, 1);
        assert!(report.collections_with_gaps.is_empty());
        assert_eq!(report.complete_collections(), 1);
    }

    #[tokio::test]
    async fn test_missing_members_reported_sorted_by_release_date() {
        let catalog = FakeCatalog::new().with_collection(
            8091,
            "Alien Collection",
            &[
                (348, "Alien", "1979-05-25"),
                (679, "Aliens", "1986-07-18"),
                (8077, "Alien 3", "1992-05-22"),
            ],
        );
        let finder = MovieGapFinder::new(&catalog, MovieGapOptions::default());
        let report = finder.find_gaps("Movies", &owned(&[348])).await.unwrap();

        assert_eq!(report.collections_with_gaps.len(), 1);
        let gap = &report.collections_with_gaps[0];
        assert_eq!(gap.collection_name, "Alien Collection");
        assert_eq!(gap.owned_movies, 1);
        assert_eq!(gap.total_movies, 3);
        let titles: Vec<&str> = gap.missing_movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Aliens", "Alien 3"]);
    }

    #[tokio::test]
    async fn test_scenario_two_owned_of_four() {
        let catalog = FakeCatalog::new().with_collection(
            5,
            "C",
            &[
                (1, "First", "2000-01-01"),
                (2, "Second", "2001-01-01"),
                (3, "Third", "2002-01-01"),
                (4, "Fourth", "2003-01-01"),
            ],
        );
        let options = MovieGapOptions {
            min_collection_size: 2,
            ..Default::default()
        };
        let finder = MovieGapFinder::new(&catalog, options);
        let report = finder.find_gaps("Movies", &owned(&[1, 2])).await.unwrap();

        let gap = &report.collections_with_gaps[0];
        let ids: Vec<i64> = gap.missing_movies.iter().map(|m| m.tmdb_id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_future_releases_excluded_by_default() {
        let catalog = FakeCatalog::new().with_collection(
            1,
            "Test",
            &[
                (100, "Released", "2020-01-01"),
                (101, "Future", "2099-12-31"),
                (102, "Undated", ""),
            ],
        );
        let finder = MovieGapFinder::new(&catalog, MovieGapOptions::default());
        let report = finder.find_gaps("Movies", &owned(&[100])).await.unwrap();

        assert!(report.collections_with_gaps.is_empty());
    }

    #[tokio::test]
    async fn test_future_releases_included_when_enabled() {
        let catalog = FakeCatalog::new().with_collection(
            1,
            "Test",
            &[(100, "Released", "2020-01-01"), (101, "Future", "2099-12-31")],
        );
        let options = MovieGapOptions {
            include_future: true,
            ..Default::default()
        };
        let finder = MovieGapFinder::new(&catalog, options);
        let report = finder.find_gaps("Movies", &owned(&[100])).await.unwrap();

        assert_eq!(report.collections_with_gaps.len(), 1);
        assert_eq!(
            report.collections_with_gaps[0].missing_movies[0].title,
            "Future"
        );
    }

    #[tokio::test]
    async fn test_collection_size_floor() {
        let catalog = FakeCatalog::new().with_collection(
            1,
            "Duo",
            &[(100, "One", "2020-01-01"), (101, "Two", "2021-01-01")],
        );

        let options = MovieGapOptions {
            min_collection_size: 3,
            ..Default::default()
        };
        let finder = MovieGapFinder::new(&catalog, options);
        let report = finder.find_gaps("Movies", &owned(&[100])).await.unwrap();
        assert!(report.collections_with_gaps.is_empty());

        let options = MovieGapOptions {
            min_collection_size: 2,
            ..Default::default()
        };
        let finder = MovieGapFinder::new(&catalog, options);
        let report = finder.find_gaps("Movies", &owned(&[100])).await.unwrap();
        assert_eq!(report.collections_with_gaps.len(), 1);
    }

    #[tokio::test]
    async fn test_min_owned_floor() {
        let catalog = FakeCatalog::new().with_collection(
            1,
            "Trilogy",
            &[
                (100, "One", "2020-01-01"),
                (101, "Two", "2021-01-01"),
                (102, "Three", "2022-01-01"),
            ],
        );
        let options = MovieGapOptions {
            min_owned: 2,
            ..Default::default()
        };
        let finder = MovieGapFinder::new(&catalog, options);
        let report = finder.find_gaps("Movies", &owned(&[100])).await.unwrap();
        assert!(report.collections_with_gaps.is_empty());
    }

    #[tokio::test]
    async fn test_excluded_collection_skipped() {
        let catalog = FakeCatalog::new().with_collection(
            1,
            "Anthology Collection",
            &[(100, "One", "2020-01-01"), (101, "Two", "2021-01-01")],
        );
        let options = MovieGapOptions {
            excluded_collections: vec!["anthology collection".to_string()],
            ..Default::default()
        };
        let finder = MovieGapFinder::new(&catalog, options);
        let report = finder.find_gaps("Movies", &owned(&[100])).await.unwrap();

        assert!(report.collections_with_gaps.is_empty());
        assert_eq!(report.skipped.excluded, 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_skips_movie_and_continues() {
        let mut catalog = FakeCatalog::new().with_collection(
            1,
            "Pair",
            &[(100, "One", "2020-01-01"), (101, "Two", "2021-01-01")],
        );
        catalog.failing_movies.push(999);

        let finder = MovieGapFinder::new(&catalog, MovieGapOptions::default());
        let report = finder.find_gaps("Movies", &owned(&[100, 999])).await.unwrap();

        assert_eq!(report.skipped.lookup_failed, 1);
        assert_eq!(report.collections_with_gaps.len(), 1);
    }

    #[tokio::test]
    async fn test_idempotent_over_same_inputs() {
        let catalog = FakeCatalog::new().with_collection(
            1,
            "Pair",
            &[(100, "One", "2020-01-01"), (101, "Two", "2021-01-01")],
        );
        let finder = MovieGapFinder::new(&catalog, MovieGapOptions::default());
        let snapshot = owned(&[100]);

        let a = finder.find_gaps("Movies", &snapshot).await.unwrap();
        let b = finder.find_gaps("Movies", &snapshot).await.unwrap();

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_returns_partial() {
        let catalog = FakeCatalog::new().with_collection(
            1,
            "Pair",
            &[(100, "One", "2020-01-01"), (101, "Two", "2021-01-01")],
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let finder =
            MovieGapFinder::new(&catalog, MovieGapOptions::default()).with_cancellation(cancel);
        let report = finder.find_gaps("Movies", &owned(&[100])).await.unwrap();

        assert!(report.cancelled);
        assert!(report.collections_with_gaps.is_empty());
    }
}
