// TVDB episode catalog adapter
// API Documentation: https://thetvdb.github.io/v4-api/
//
// Resolves a series id to its complete, season-partitioned episode list.
// The underlying endpoint paginates; every page is fetched and assembled
// before anything is cached, so a partial list can never be served.
// Authentication is a bearer token obtained once and refreshed exactly
// once if a call comes back 401 mid-scan.

use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::cache::{Cache, EPISODES_TTL_HOURS};
use crate::models::{EpisodeRecord, SeriesEpisodeList};
use crate::retry::RetryPolicy;
use crate::services::{status_error, CatalogError};

const TVDB_API_BASE: &str = "https://api4.thetvdb.com/v4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TVDB v4 API client
pub struct TvdbClient {
    client: Client,
    api_key: String,
    pin: Option<String>,
    token: RwLock<Option<String>>,
    cache: Cache,
    retry: RetryPolicy,
}

// === API request/response types ===

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    apikey: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pin: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    data: LoginData,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct EpisodesResponse {
    data: EpisodesData,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct EpisodesData {
    #[serde(default)]
    series: Option<SeriesInfo>,
    #[serde(default)]
    episodes: Vec<EpisodeEntry>,
}

#[derive(Debug, Deserialize)]
struct SeriesInfo {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeEntry {
    id: i64,
    #[serde(rename = "seasonNumber")]
    season_number: Option<u32>,
    number: Option<u32>,
    name: Option<String>,
    aired: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<String>,
}

impl TvdbClient {
    pub fn new(
        api_key: String,
        pin: Option<String>,
        cache: Cache,
        retry: RetryPolicy,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(CatalogError::Http)?;
        Ok(Self {
            client,
            api_key,
            pin,
            token: RwLock::new(None),
            cache,
            retry,
        })
    }

    /// Verify the credentials before any scan work begins.
    pub async fn verify(&self) -> Result<(), CatalogError> {
        self.login().await?;
        Ok(())
    }

    /// The complete canonical episode list for a series, partitioned by
    /// season. Cache-first with the episode-list TTL.
    pub async fn series_episodes(&self, series_id: i64) -> Result<SeriesEpisodeList, CatalogError> {
        fetch_series_episodes(&self.cache, series_id, |page| {
            let url = format!(
                "{}/series/{}/episodes/default?page={}",
                TVDB_API_BASE, series_id, page
            );
            async move { self.get_with_retry::<EpisodesResponse>(&url).await }
        })
        .await
    }

    /// Authenticate and store the bearer token for subsequent calls.
    async fn login(&self) -> Result<String, CatalogError> {
        let body = LoginRequest {
            apikey: &self.api_key,
            pin: self.pin.as_deref(),
        };
        let response = self
            .client
            .post(format!("{}/login", TVDB_API_BASE))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(&response));
        }

        let login: LoginResponse = response.json().await.map_err(CatalogError::from)?;
        *self.token.write().await = Some(login.data.token.clone());
        tracing::debug!("Authenticated with TVDB");
        Ok(login.data.token)
    }

    async fn current_token(&self) -> Result<String, CatalogError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login().await
    }

    async fn get_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, CatalogError> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay(attempt, e.retry_after());
                    tracing::debug!(
                        "TVDB request failed ({}), retrying in {:?} (attempt {})",
                        e,
                        delay,
                        attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One authenticated GET. A 401 means the token expired or was
    /// revoked mid-scan: re-authenticate once and retry the call exactly
    /// once before surfacing the error.
    async fn get_once<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        let token = self.current_token().await?;
        match self.get_with_token(url, &token).await {
            Err(CatalogError::Unauthorized) => {
                tracing::info!("TVDB token rejected, re-authenticating");
                let token = self.login().await?;
                self.get_with_token(url, &token).await
            }
            other => other,
        }
    }

    async fn get_with_token<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> Result<T, CatalogError> {
        let response = self.client.get(url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(status_error(&response));
        }
        response.json().await.map_err(CatalogError::from)
    }
}

/// Cache-first episode-list fetch. Pages are pulled through `fetch_page`
/// until `links.next` runs out and assembled into one season-partitioned
/// list; only that complete list is cached, so a failed page mid-way
/// through caches nothing.
async fn fetch_series_episodes<F, Fut>(
    cache: &Cache,
    series_id: i64,
    mut fetch_page: F,
) -> Result<SeriesEpisodeList, CatalogError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<EpisodesResponse, CatalogError>>,
{
    let key = series_id.to_string();
    if let Some(cached) = cache.get::<SeriesEpisodeList>("tvdb", "episodes", &key) {
        tracing::trace!("Cache hit for series {}", series_id);
        return Ok(cached);
    }

    let mut seasons: BTreeMap<u32, Vec<EpisodeRecord>> = BTreeMap::new();
    let mut name = None;
    let mut page: u32 = 0;

    loop {
        let response = fetch_page(page).await?;

        if name.is_none() {
            name = response.data.series.and_then(|s| s.name);
        }

        for entry in response.data.episodes {
            let (Some(season), Some(episode)) = (entry.season_number, entry.number) else {
                tracing::debug!("Episode {} missing season/number, skipped", entry.id);
                continue;
            };
            seasons.entry(season).or_default().push(EpisodeRecord {
                tvdb_id: entry.id,
                season,
                episode,
                title: entry.name,
                aired: entry
                    .aired
                    .as_deref()
                    .filter(|d| !d.is_empty())
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            });
        }

        if response.links.next.is_none() {
            break;
        }
        page += 1;
    }

    for episodes in seasons.values_mut() {
        episodes.sort_by_key(|e| e.episode);
    }

    let list = SeriesEpisodeList {
        tvdb_id: series_id,
        name,
        seasons,
    };

    if let Err(e) = cache.set(
        "tvdb",
        "episodes",
        &key,
        &list,
        EPISODES_TTL_HOURS,
        list.name.as_deref().unwrap_or("episode list"),
    ) {
        tracing::warn!("Failed to cache series {}: {}", series_id, e);
    }

    Ok(list)
}
