// Plex Media Server client - read-only source of owned items
// API: https://www.plexopedia.com/plex-media-server/api/
//
// Builds the library snapshot the gap engines consume: owned movies with
// their TMDB ids, and owned shows with every (season, episode) pair on
// disk. Items that cannot be matched to an external id are counted, never
// silently dropped.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{MovieSnapshot, OwnedEpisode, OwnedMovie, OwnedShow, ShowSnapshot};
use crate::parser::parse_episodes;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Plex HTTP API client
pub struct PlexClient {
    client: Client,
    base_url: String,
    token: String,
}

/// A library section on the server.
#[derive(Debug, Clone)]
pub struct PlexLibrary {
    pub key: String,
    pub title: String,
    pub library_type: String,
}

// === API response types ===

#[derive(Debug, Deserialize)]
struct SectionsResponse {
    #[serde(rename = "MediaContainer")]
    media_container: SectionsContainer,
}

#[derive(Debug, Deserialize)]
struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    key: String,
    title: String,
    #[serde(rename = "type")]
    section_type: String,
}

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    #[serde(rename = "MediaContainer")]
    media_container: ItemsContainer,
}

#[derive(Debug, Deserialize)]
struct ItemsContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "ratingKey")]
    rating_key: String,
    title: Option<String>,
    year: Option<i32>,
    #[serde(rename = "Guid", default)]
    guids: Vec<GuidEntry>,
    #[serde(rename = "parentIndex")]
    parent_index: Option<u32>,
    index: Option<u32>,
    #[serde(rename = "Media", default)]
    media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct GuidEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(rename = "Part", default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    file: Option<String>,
}

impl Item {
    /// Extract an external id from Guid entries like "tmdb://603".
    fn guid_id(&self, scheme: &str) -> Option<i64> {
        let prefix = format!("{}://", scheme);
        self.guids
            .iter()
            .find_map(|g| g.id.strip_prefix(&prefix))
            .and_then(|id| id.parse().ok())
    }

    fn file_path(&self) -> Option<&str> {
        self.media
            .iter()
            .flat_map(|m| m.parts.iter())
            .find_map(|p| p.file.as_deref())
    }
}

impl PlexClient {
    pub fn new(base_url: String, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to reach Plex at {}", self.base_url))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            anyhow::bail!("Plex rejected the token (401) - check PLEX_TOKEN");
        }
        if !response.status().is_success() {
            anyhow::bail!("Plex returned status {} for {}", response.status(), path);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Plex response for {}", path))
    }

    /// Verify connectivity and the token before any scan work begins.
    pub async fn connect(&self) -> Result<()> {
        let _: SectionsResponse = self.get_json("/library/sections").await?;
        Ok(())
    }

    /// All library sections of the given type ("movie" or "show").
    pub async fn libraries(&self, section_type: &str) -> Result<Vec<PlexLibrary>> {
        let response: SectionsResponse = self.get_json("/library/sections").await?;
        Ok(response
            .media_container
            .directories
            .into_iter()
            .filter(|s| s.section_type == section_type)
            .map(|s| PlexLibrary {
                key: s.key,
                title: s.title,
                library_type: s.section_type,
            })
            .collect())
    }

    /// Enumerate a movie library. Items without a TMDB guid are tallied
    /// and left out of the owned set.
    pub async fn snapshot_movies(&self, library: &PlexLibrary) -> Result<MovieSnapshot> {
        let response: ItemsResponse = self
            .get_json(&format!(
                "/library/sections/{}/all?includeGuids=1",
                library.key
            ))
            .await?;

        let snapshot = build_movie_snapshot(response.media_container.metadata);
        tracing::info!(
            "Library '{}': {} movies, {} without TMDB id",
            library.title,
            snapshot.movies.len(),
            snapshot.skipped_no_external_id
        );
        Ok(snapshot)
    }

    /// Enumerate a TV library: every show with every owned (season,
    /// episode) pair. Shows without a TVDB guid are tallied; so are
    /// episode files that neither Plex nor the filename parser could
    /// place.
    pub async fn snapshot_shows(&self, library: &PlexLibrary) -> Result<ShowSnapshot> {
        let response: ItemsResponse = self
            .get_json(&format!(
                "/library/sections/{}/all?includeGuids=1",
                library.key
            ))
            .await?;

        let mut snapshot = ShowSnapshot::default();
        for show_item in response.media_container.metadata {
            snapshot.scanned += 1;
            let title = show_item.title.clone().unwrap_or_default();
            let Some(tvdb_id) = show_item.guid_id("tvdb") else {
                tracing::debug!("Show without TVDB id skipped: {}", title);
                snapshot.skipped_no_external_id += 1;
                continue;
            };

            let episodes = self
                .owned_episodes(&show_item.rating_key, &mut snapshot.skipped_unparsed)
                .await
                .with_context(|| format!("Failed to list episodes for '{}'", title))?;

            snapshot.shows.push(OwnedShow {
                tvdb_id,
                title,
                episodes,
            });
        }

        tracing::info!(
            "Library '{}': {} shows, {} without TVDB id, {} unparsed items",
            library.title,
            snapshot.shows.len(),
            snapshot.skipped_no_external_id,
            snapshot.skipped_unparsed
        );
        Ok(snapshot)
    }

    async fn owned_episodes(
        &self,
        show_rating_key: &str,
        skipped_unparsed: &mut u32,
    ) -> Result<Vec<OwnedEpisode>> {
        let response: ItemsResponse = self
            .get_json(&format!("/library/metadata/{}/allLeaves", show_rating_key))
            .await?;

        Ok(collect_owned_episodes(
            response.media_container.metadata,
            skipped_unparsed,
        ))
    }
}

/// Tally every movie item into the snapshot: owned when a TMDB guid is
/// present, counted as skipped otherwise.
fn build_movie_snapshot(items: Vec<Item>) -> MovieSnapshot {
    let mut snapshot = MovieSnapshot::default();
    for item in items {
        snapshot.scanned += 1;
        match item.guid_id("tmdb") {
            Some(tmdb_id) => snapshot.movies.push(OwnedMovie {
                tmdb_id,
                title: item.title.unwrap_or_default(),
                year: item.year,
            }),
            None => {
                tracing::debug!(
                    "Movie without TMDB id skipped: {}",
                    item.title.as_deref().unwrap_or("<untitled>")
                );
                snapshot.skipped_no_external_id += 1;
            }
        }
    }
    snapshot
}

/// The (season, episode) pairs one episode item contributes, or None if
/// the item cannot be placed at all.
///
/// The filename wins when it parses: a multi-episode file yields every
/// pair it covers, where Plex reports only the first. Plex's own
/// season/episode indices are the fallback for filenames that say
/// nothing.
fn item_episode_pairs(item: &Item) -> Option<Vec<OwnedEpisode>> {
    let parsed = item
        .file_path()
        .map(extract_filename)
        .map(parse_episodes)
        .unwrap_or_default();
    if !parsed.is_empty() {
        return Some(parsed);
    }
    if let (Some(season), Some(episode)) = (item.parent_index, item.index) {
        return Some(vec![OwnedEpisode { season, episode }]);
    }
    None
}

/// Resolve every episode item, tallying the ones that cannot be placed.
/// The result is sorted and deduplicated.
fn collect_owned_episodes(items: Vec<Item>, skipped_unparsed: &mut u32) -> Vec<OwnedEpisode> {
    let mut episodes = Vec::new();
    for item in items {
        match item_episode_pairs(&item) {
            Some(pairs) => episodes.extend(pairs),
            None => {
                tracing::debug!(
                    "Unparseable episode item skipped: {}",
                    item.file_path().unwrap_or("<no file>")
                );
                *skipped_unparsed += 1;
            }
        }
    }
    episodes.sort_by_key(|e| (e.season, e.episode));
    episodes.dedup();
    episodes
}

fn extract_filename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_id_extraction() {
        let item = Item {
            rating_key: "1".into(),
            title: Some("Alien".into()),
            year: Some(1979),
            guids: vec![
                GuidEntry {
                    id: "imdb://tt0078748".into(),
                },
                GuidEntry {
                    id: "tmdb://348".into(),
                },
            ],
            parent_index: None,
            index: None,
            media: Vec::new(),
        };
        assert_eq!(item.guid_id("tmdb"), Some(348));
        assert_eq!(item.guid_id("tvdb"), None);
    }

    fn item(
        title: Option<&str>,
        guid: Option<&str>,
        indices: Option<(u32, u32)>,
        file: Option<&str>,
    ) -> Item {
        Item {
            rating_key: "1".into(),
            title: title.map(str::to_string),
            year: None,
            guids: guid
                .map(|g| vec![GuidEntry { id: g.to_string() }])
                .unwrap_or_default(),
            parent_index: indices.map(|(s, _)| s),
            index: indices.map(|(_, e)| e),
            media: file
                .map(|f| {
                    vec![Media {
                        parts: vec![Part {
                            file: Some(f.to_string()),
                        }],
                    }]
                })
                .unwrap_or_default(),
        }
    }

    #[test]
    fn test_movie_snapshot_tallies_items_without_tmdb_id() {
        let items = vec![
            item(Some("Alien"), Some("tmdb://348"), None, None),
            item(Some("Aliens"), Some("tmdb://679"), None, None),
            item(Some("Home Video"), Some("imdb://tt999"), None, None),
            item(Some("Unmatched"), None, None, None),
        ];
        let snapshot = build_movie_snapshot(items);

        assert_eq!(snapshot.scanned, 4);
        assert_eq!(snapshot.movies.len(), 2);
        assert_eq!(snapshot.skipped_no_external_id, 2);
        assert_eq!(snapshot.movies[0].tmdb_id, 348);
    }

    #[test]
    fn test_multi_episode_filename_beats_plex_index() {
        // Plex reports the double episode as a single (2, 1) item; the
        // filename recovers all three pairs.
        let item = item(
            None,
            None,
            Some((2, 1)),
            Some("/tv/Show/Season 02/Show S02E01-E03.mkv"),
        );
        let pairs = item_episode_pairs(&item).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[2], OwnedEpisode {
            season: 2,
            episode: 3
        });
    }

    #[test]
    fn test_plex_index_fallback_when_filename_says_nothing() {
        let item = item(None, None, Some((4, 7)), Some("/tv/Show/Finale Part One.mkv"));
        assert_eq!(
            item_episode_pairs(&item),
            Some(vec![OwnedEpisode {
                season: 4,
                episode: 7
            }])
        );
    }

    #[test]
    fn test_unplaceable_item_yields_none() {
        let item = item(None, None, None, Some("/tv/Show/extras/interview.mkv"));
        assert!(item_episode_pairs(&item).is_none());
    }

    #[test]
    fn test_collect_owned_episodes_tallies_sorts_and_dedupes() {
        let items = vec![
            item(None, None, Some((1, 2)), None),
            item(None, None, None, Some("/tv/Show S01E01.mkv")),
            // Same episode reachable through two files.
            item(None, None, None, Some("/tv/Show S01E02 repack.mkv")),
            item(None, None, None, Some("/tv/Show/sample.mkv")),
        ];
        let mut skipped = 0;
        let episodes = collect_owned_episodes(items, &mut skipped);

        let pairs: Vec<(u32, u32)> = episodes.iter().map(|e| (e.season, e.episode)).collect();
        assert_eq!(pairs, vec![(1, 1), (1, 2)]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_extract_filename() {
        assert_eq!(
            extract_filename("/data/tv/Show/Season 02/Show S02E01-E02.mkv"),
            "Show S02E01-E02.mkv"
        );
        assert_eq!(
            extract_filename(r"D:\tv\Show\Show S01E01.mkv"),
            "Show S01E01.mkv"
        );
    }

    #[test]
    fn test_sections_json_shape() {
        let json = r#"{
            "MediaContainer": {
                "Directory": [
                    {"key": "1", "type": "movie", "title": "Movies"},
                    {"key": "2", "type": "show", "title": "TV Shows"}
                ]
            }
        }"#;
        let parsed: SectionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.media_container.directories.len(), 2);
        assert_eq!(parsed.media_container.directories[1].section_type, "show");
    }

    #[test]
    fn test_items_json_shape_with_guids_and_parts() {
        let json = r#"{
            "MediaContainer": {
                "Metadata": [
                    {
                        "ratingKey": "42",
                        "title": "The Expanse",
                        "Guid": [{"id": "tvdb://280619"}],
                        "parentIndex": 3,
                        "index": 7,
                        "Media": [{"Part": [{"file": "/tv/The.Expanse.S03E07.mkv"}]}]
                    }
                ]
            }
        }"#;
        let parsed: ItemsResponse = serde_json::from_str(json).unwrap();
        let item = &parsed.media_container.metadata[0];
        assert_eq!(item.guid_id("tvdb"), Some(280619));
        assert_eq!(item.file_path(), Some("/tv/The.Expanse.S03E07.mkv"));
        assert_eq!(item.parent_index, Some(3));
    }
}
