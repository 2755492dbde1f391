// TMDB movie catalog adapter
// API Documentation: https://developer.themoviedb.org/reference/intro/getting-started
//
// Answers exactly two questions for the movie gap engine: which
// collection does a movie belong to, and what is the full member list of
// a collection. Both are cache-first with a 7-day TTL; rate limits and
// timeouts go through the shared backoff policy.

use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::cache::{Cache, COLLECTION_TTL_HOURS, MOVIE_TTL_HOURS};
use crate::models::{CollectionMovie, CollectionRecord, CollectionRef};
use crate::retry::RetryPolicy;
use crate::services::{status_error, CatalogError};

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TMDB API client
pub struct TmdbClient {
    client: Client,
    api_key: String,
    cache: Cache,
    retry: RetryPolicy,
}

// === API response types ===

#[derive(Debug, Deserialize)]
struct MovieDetails {
    id: i64,
    #[serde(default)]
    belongs_to_collection: Option<CollectionInfo>,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CollectionDetails {
    id: i64,
    name: String,
    #[serde(default)]
    parts: Vec<CollectionPart>,
}

#[derive(Debug, Deserialize)]
struct CollectionPart {
    id: i64,
    title: String,
    release_date: Option<String>,
}

impl CollectionDetails {
    /// Validate the loosely-typed payload into the record the gap engine
    /// consumes. Empty or malformed release dates become None.
    fn into_record(self) -> CollectionRecord {
        CollectionRecord {
            id: self.id,
            name: self.name,
            movies: self
                .parts
                .into_iter()
                .map(|p| CollectionMovie {
                    tmdb_id: p.id,
                    title: p.title,
                    release_date: p
                        .release_date
                        .as_deref()
                        .filter(|d| !d.is_empty())
                        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
                })
                .collect(),
        }
    }
}

impl TmdbClient {
    pub fn new(api_key: String, cache: Cache, retry: RetryPolicy) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(CatalogError::Http)?;
        Ok(Self {
            client,
            api_key,
            cache,
            retry,
        })
    }

    /// Verify the API key before any scan work begins.
    pub async fn verify(&self) -> Result<(), CatalogError> {
        let url = format!("{}/configuration?api_key={}", TMDB_API_BASE, self.api_key);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(status_error(&response));
        }
        Ok(())
    }

    /// Resolve the collection a movie belongs to, if any. A movie with
    /// no collection is a valid result, cached like any other.
    pub async fn movie_collection(
        &self,
        movie_id: i64,
    ) -> Result<Option<CollectionRef>, CatalogError> {
        let key = movie_id.to_string();
        if let Some(cached) = self
            .cache
            .get::<Option<CollectionRef>>("tmdb", "movies", &key)
        {
            tracing::trace!("Cache hit for movie {}", movie_id);
            return Ok(cached);
        }

        let url = format!(
            "{}/movie/{}?api_key={}",
            TMDB_API_BASE, movie_id, self.api_key
        );
        let details: MovieDetails = self.get_with_retry(&url).await?;

        let collection = details.belongs_to_collection.map(|c| CollectionRef {
            id: c.id,
            name: c.name,
        });

        if let Err(e) = self.cache.set(
            "tmdb",
            "movies",
            &key,
            &collection,
            MOVIE_TTL_HOURS,
            &format!("Collection membership for movie {}", details.id),
        ) {
            tracing::warn!("Failed to cache movie {}: {}", movie_id, e);
        }

        Ok(collection)
    }

    /// Fetch the full, authoritative member list of a collection.
    pub async fn collection(&self, collection_id: i64) -> Result<CollectionRecord, CatalogError> {
        let key = collection_id.to_string();
        if let Some(cached) = self
            .cache
            .get::<CollectionRecord>("tmdb", "collections", &key)
        {
            tracing::trace!("Cache hit for collection {}", collection_id);
            return Ok(cached);
        }

        let url = format!(
            "{}/collection/{}?api_key={}",
            TMDB_API_BASE, collection_id, self.api_key
        );
        let details: CollectionDetails = self.get_with_retry(&url).await?;
        let record = details.into_record();

        if let Err(e) = self.cache.set(
            "tmdb",
            "collections",
            &key,
            &record,
            COLLECTION_TTL_HOURS,
            &record.name,
        ) {
            tracing::warn!("Failed to cache collection {}: {}", collection_id, e);
        }

        Ok(record)
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
                        "TMDB request failed ({}), retrying in {:?} (attempt {})",
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

    async fn get_once<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(status_error(&response));
        }
        response.json().await.map_err(CatalogError::from)
    }
}
