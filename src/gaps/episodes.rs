// Episode gap detection.
//
// Per show: fetch the canonical episode list, then per season diff it
// against the owned (season, episode) pairs. Episodes that have not
// aired yet, or aired within the recent-threshold window, are not
// counted as missing by default.

use chrono::{NaiveDate, TimeDelta, Utc};
use futures::StreamExt;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use crate::models::{
    EpisodeGapReport, EpisodeRecord, MissingEpisode, OwnedShow, SeasonGap, ShowGap, ShowSnapshot,
    SkippedTally,
};
use crate::services::CatalogError;

use super::{is_excluded, EpisodeCatalog, ProgressFn, DEFAULT_CONCURRENCY};

#[derive(Debug, Clone)]
pub struct EpisodeGapOptions {
    /// Treat unaired (or undated) episodes as missing too.
    pub include_future: bool,
    /// Consider season 0 when diffing.
    pub include_specials: bool,
    /// Episodes that aired within this many hours are not reported,
    /// leaving headroom for release and import delays.
    pub recent_threshold_hours: i64,
    /// Show titles to skip entirely.
    pub excluded_shows: Vec<String>,
    /// Report shows with zero owned episodes. When false they are
    /// dropped, on the theory that a show never started is a choice
    /// rather than a gap.
    pub report_empty_series: bool,
    pub concurrency: usize,
}

impl Default for EpisodeGapOptions {
    fn default() -> Self {
        Self {
            include_future: false,
            include_specials: false,
            recent_threshold_hours: 48,
            excluded_shows: Vec::new(),
            report_empty_series: true,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

pub struct EpisodeGapFinder<'a, C: EpisodeCatalog + ?Sized> {
    catalog: &'a C,
    options: EpisodeGapOptions,
    cancel: CancellationToken,
    progress: Option<Box<ProgressFn>>,
}

impl<'a, C: EpisodeCatalog + ?Sized> EpisodeGapFinder<'a, C> {
    pub fn new(catalog: &'a C, options: EpisodeGapOptions) -> Self {
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

    pub async fn find_gaps(
        &self,
        library_name: &str,
        snapshot: &ShowSnapshot,
    ) -> Result<EpisodeGapReport, CatalogError> {
        let mut skipped = SkippedTally {
            no_external_id: snapshot.skipped_no_external_id,
            unparsed: snapshot.skipped_unparsed,
            ..Default::default()
        };
        let episodes_owned: usize = snapshot.shows.iter().map(|s| s.episodes.len()).sum();

        let eligible: Vec<&OwnedShow> = snapshot
            .shows
            .iter()
            .filter(|show| {
                if is_excluded(&show.title, &self.options.excluded_shows) {
                    tracing::info!("Show excluded by configuration: {}", show.title);
                    skipped.excluded += 1;
                    return false;
                }
                if show.episodes.is_empty() && !self.options.report_empty_series {
                    tracing::debug!("Skipping show with no owned episodes: {}", show.title);
                    skipped.empty_series += 1;
                    return false;
                }
                true
            })
            .collect();

        let total = eligible.len() as u64;
        self.report_progress("Fetching episode lists", 0, total);

        let catalog = self.catalog;
        let mut fetches = futures::stream::iter(eligible.into_iter().map(|show| async move {
            (show, catalog.series_episodes(show.tvdb_id).await)
        }))
        .buffer_unordered(self.options.concurrency.max(1));

        let now = Utc::now();
        let today = now.date_naive();
        let mut shows_with_gaps: Vec<ShowGap> = Vec::new();
        let mut done = 0u64;
        let mut cancelled = self.cancel.is_cancelled();

        while !cancelled {
            let Some((show, result)) = fetches.next().await else {
                break;
            };
            done += 1;
            self.report_progress("Fetching episode lists", done, total);
            match result {
                Ok(list) => {
                    if let Some(gap) = self.diff_show(show, &list.seasons, today, now) {
                        shows_with_gaps.push(gap);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "Skipping '{}': episode list fetch failed: {}",
                        show.title,
                        e
                    );
                    skipped.lookup_failed += 1;
                }
            }
            cancelled = self.cancel.is_cancelled();
        }
        drop(fetches);

        shows_with_gaps.sort_by(|a, b| a.show_title.cmp(&b.show_title));

        Ok(EpisodeGapReport {
            library_name: library_name.to_string(),
            shows_scanned: snapshot.scanned,
            shows_with_tvdb_id: snapshot.shows.len(),
            episodes_owned,
            shows_with_gaps,
            skipped,
            cancelled,
        })
    }

    fn diff_show(
        &self,
        show: &OwnedShow,
        seasons: &std::collections::BTreeMap<u32, Vec<EpisodeRecord>>,
        today: NaiveDate,
        now: chrono::DateTime<Utc>,
    ) -> Option<ShowGap> {
        let owned: HashSet<(u32, u32)> = show
            .episodes
            .iter()
            .map(|e| (e.season, e.episode))
            .collect();

        let mut total_episodes = 0;
        let mut owned_episodes = 0;
        let mut seasons_with_gaps = Vec::new();

        for (&season, episodes) in seasons {
            if season == 0 && !self.options.include_specials {
                continue;
            }

            let season_total = episodes.len();
            let season_owned = episodes
                .iter()
                .filter(|ep| owned.contains(&(ep.season, ep.episode)))
                .count();
            total_episodes += season_total;
            owned_episodes += season_owned;

            let missing: Vec<MissingEpisode> = episodes
                .iter()
                .filter(|ep| !owned.contains(&(ep.season, ep.episode)))
                .filter(|ep| self.counts_as_missing(ep, today, now))
                .map(|ep| MissingEpisode {
                    tvdb_id: ep.tvdb_id,
                    season: ep.season,
                    episode: ep.episode,
                    title: ep.title.clone(),
                    aired: ep.aired,
                })
                .collect();

            if !missing.is_empty() {
                seasons_with_gaps.push(SeasonGap {
                    season,
                    total_episodes: season_total,
                    owned_episodes: season_owned,
                    missing_episodes: missing,
                });
            }
        }

        if seasons_with_gaps.is_empty() {
            return None;
        }
        Some(ShowGap {
            tvdb_id: show.tvdb_id,
            show_title: show.title.clone(),
            total_episodes,
            owned_episodes,
            seasons_with_gaps,
        })
    }

    fn counts_as_missing(
        &self,
        ep: &EpisodeRecord,
        today: NaiveDate,
        now: chrono::DateTime<Utc>,
    ) -> bool {
        let Some(aired) = ep.aired else {
            // Undated episodes are treated as unaired.
            return self.options.include_future;
        };
        if aired > today {
            return self.options.include_future;
        }
        // Air dates carry no time of day; measure from midnight UTC.
        let aired_at = aired.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        if now - aired_at < TimeDelta::hours(self.options.recent_threshold_hours) {
            tracing::debug!(
                "Suppressing recently aired {} {}",
                ep.episode_code(),
                aired
            );
            return false;
        }
        true
    }
}
