// Value objects shared between the library snapshot, catalog adapters,
// and the gap engines. Everything here is built fresh per scan.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A movie owned in the local library, matched by its TMDB id.
#[derive(Debug, Clone)]
pub struct OwnedMovie {
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<i32>,
}

/// One (season, episode) pair owned on disk. A multi-episode file yields
/// several of these sharing the same path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnedEpisode {
    pub season: u32,
    pub episode: u32,
}

/// A TV show present in the library snapshot, with whatever episodes
/// could be matched. `episodes` may be empty for a freshly-added show.
#[derive(Debug, Clone)]
pub struct OwnedShow {
    pub tvdb_id: i64,
    pub title: String,
    pub episodes: Vec<OwnedEpisode>,
}

/// Result of enumerating a movie library, with accounting for items
/// that could not be matched.
#[derive(Debug, Clone, Default)]
pub struct MovieSnapshot {
    pub movies: Vec<OwnedMovie>,
    /// Every item seen, including ones skipped for lack of an id.
    pub scanned: usize,
    pub skipped_no_external_id: u32,
}

/// Result of enumerating a TV library. Shows with zero matched episodes
/// are still included so the empty-series policy can decide their fate.
#[derive(Debug, Clone, Default)]
pub struct ShowSnapshot {
    pub shows: Vec<OwnedShow>,
    pub scanned: usize,
    pub skipped_no_external_id: u32,
    /// On-disk items whose filename yielded no (season, episode) pair.
    pub skipped_unparsed: u32,
}

/// Collection membership as reported by the movie catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRef {
    pub id: i64,
    pub name: String,
}

/// A movie inside a catalog collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMovie {
    pub tmdb_id: i64,
    pub title: String,
    pub release_date: Option<NaiveDate>,
}

impl CollectionMovie {
    pub fn year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.release_date.map(|d| d.year())
    }
}

/// The authoritative full member list of a collection. "Missing" is
/// always computed against `movies`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: i64,
    pub name: String,
    pub movies: Vec<CollectionMovie>,
}

/// One episode from the canonical catalog listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub tvdb_id: i64,
    pub season: u32,
    pub episode: u32,
    pub title: Option<String>,
    pub aired: Option<NaiveDate>,
}

impl EpisodeRecord {
    /// Display code like `S02E05`.
    pub fn episode_code(&self) -> String {
        format!("S{:02}E{:02}", self.season, self.episode)
    }

    pub fn is_special(&self) -> bool {
        self.season == 0
    }
}

/// Complete episode list for one series, partitioned by season.
/// Seasons iterate in ascending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesEpisodeList {
    pub tvdb_id: i64,
    pub name: Option<String>,
    pub seasons: BTreeMap<u32, Vec<EpisodeRecord>>,
}

impl SeriesEpisodeList {
    pub fn episode_count(&self) -> usize {
        self.seasons.values().map(Vec::len).sum()
    }
}

/// Why items were left out of a scan, broken down by reason so coverage
/// gaps are distinguishable from ownership gaps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SkippedTally {
    /// No external id on the library item.
    pub no_external_id: u32,
    /// Filename the parser could not make sense of.
    pub unparsed: u32,
    /// Catalog lookup failed after retries.
    pub lookup_failed: u32,
    /// Excluded by configuration.
    pub excluded: u32,
    /// Dropped by the empty-series policy (zero owned episodes).
    pub empty_series: u32,
}

impl SkippedTally {
    pub fn total(&self) -> u32 {
        self.no_external_id + self.unparsed + self.lookup_failed + self.excluded + self.empty_series
    }
}

// === Movie gap report ===

#[derive(Debug, Clone, Serialize)]
pub struct MissingMovie {
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub release_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionGap {
    pub collection_id: i64,
    pub collection_name: String,
    pub total_movies: usize,
    pub owned_movies: usize,
    pub missing_movies: Vec<MissingMovie>,
}

impl CollectionGap {
    pub fn missing_count(&self) -> usize {
        self.missing_movies.len()
    }

    pub fn completion_percent(&self) -> f64 {
        if self.total_movies == 0 {
            return 100.0;
        }
        self.owned_movies as f64 / self.total_movies as f64 * 100.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MovieGapReport {
    pub library_name: String,
    pub movies_scanned: usize,
    pub movies_with_tmdb_id: usize,
    pub movies_in_collections: usize,
    pub unique_collections: usize,
    pub collections_with_gaps: Vec<CollectionGap>,
    pub skipped: SkippedTally,
    /// True when the scan was aborted and this is a partial report.
    pub cancelled: bool,
}

impl MovieGapReport {
    pub fn total_missing(&self) -> usize {
        self.collections_with_gaps
            .iter()
            .map(CollectionGap::missing_count)
            .sum()
    }

    pub fn complete_collections(&self) -> usize {
        self.unique_collections
            .saturating_sub(self.collections_with_gaps.len())
    }
}

// === Episode gap report ===

#[derive(Debug, Clone, Serialize)]
pub struct MissingEpisode {
    pub tvdb_id: i64,
    pub season: u32,
    pub episode: u32,
    pub title: Option<String>,
    pub aired: Option<NaiveDate>,
}

impl MissingEpisode {
    pub fn episode_code(&self) -> String {
        format!("S{:02}E{:02}", self.season, self.episode)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonGap {
    pub season: u32,
    pub total_episodes: usize,
    pub owned_episodes: usize,
    pub missing_episodes: Vec<MissingEpisode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowGap {
    pub tvdb_id: i64,
    pub show_title: String,
    pub total_episodes: usize,
    pub owned_episodes: usize,
    pub seasons_with_gaps: Vec<SeasonGap>,
}

impl ShowGap {
    pub fn missing_count(&self) -> usize {
        self.seasons_with_gaps
            .iter()
            .map(|s| s.missing_episodes.len())
            .sum()
    }

    pub fn completion_percent(&self) -> f64 {
        if self.total_episodes == 0 {
            return 100.0;
        }
        self.owned_episodes as f64 / self.total_episodes as f64 * 100.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeGapReport {
    pub library_name: String,
    pub shows_scanned: usize,
    pub shows_with_tvdb_id: usize,
    pub episodes_owned: usize,
    pub shows_with_gaps: Vec<ShowGap>,
    pub skipped: SkippedTally,
    pub cancelled: bool,
}

impl EpisodeGapReport {
    pub fn total_missing(&self) -> usize {
        self.shows_with_gaps.iter().map(ShowGap::missing_count).sum()
    }
}
