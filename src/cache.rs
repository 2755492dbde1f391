// File-backed cache for catalog API responses.
//
// Layout:
//     <cache_dir>/
//     ├── tmdb/
//     │   ├── movies/{movie_id}.json
//     │   └── collections/{collection_id}.json
//     └── tvdb/
//         └── episodes/{series_id}.json
//
// Entries are pretty-printed JSON so they can be inspected and edited by
// hand. Each file wraps the payload in a `_cache_meta` envelope carrying
// the stored-at/expiry timestamps.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// TMDB movie and collection data changes rarely.
pub const MOVIE_TTL_HOURS: i64 = 168;
pub const COLLECTION_TTL_HOURS: i64 = 168;
/// TV data changes often: new seasons, air-date corrections.
pub const EPISODES_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    ttl_hours: i64,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    _cache_meta: CacheMeta,
    data: T,
}

/// Cache statistics for the `cache stats` command.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub tmdb_movies: usize,
    pub tmdb_collections: usize,
    pub tvdb_episodes: usize,
    pub expired_entries: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

impl CacheStats {
    pub fn total_size_kb(&self) -> f64 {
        self.total_size_bytes as f64 / 1024.0
    }
}

/// File-based TTL cache. All operations are no-ops when disabled.
#[derive(Debug, Clone)]
pub struct Cache {
    cache_dir: PathBuf,
    enabled: bool,
}

impl Cache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            enabled: true,
        }
    }

    pub fn disabled(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            enabled: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, namespace: &str, category: &str, key: &str) -> PathBuf {
        self.cache_dir
            .join(namespace)
            .join(category)
            .join(format!("{}.json", key))
    }

    /// Get a cached entry if present and not expired. Expired or corrupt
    /// entries are deleted and treated as misses.
    pub fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        category: &str,
        key: &str,
    ) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(namespace, category, key);
        let contents = fs::read_to_string(&path).ok()?;

        let envelope: Envelope<T> = match serde_json::from_str(&contents) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("Removing corrupt cache entry {:?}: {}", path, e);
                let _ = fs::remove_file(&path);
                return None;
            }
        };

        if Utc::now() >= envelope._cache_meta.expires_at {
            tracing::debug!("Cache entry expired: {:?}", path);
            let _ = fs::remove_file(&path);
            return None;
        }

        Some(envelope.data)
    }

    /// Store an entry, replacing any previous value for the same key.
    /// The write is atomic: temp file then rename.
    pub fn set<T: Serialize>(
        &self,
        namespace: &str,
        category: &str,
        key: &str,
        data: &T,
        ttl_hours: i64,
        description: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let path = self.entry_path(namespace, category, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory {:?}", parent))?;
        }

        let now = Utc::now();
        let envelope = Envelope {
            _cache_meta: CacheMeta {
                cached_at: now,
                expires_at: now + Duration::hours(ttl_hours),
                ttl_hours,
                description: description.to_string(),
            },
            data,
        };

        let json = serde_json::to_string_pretty(&envelope)?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json)
            .with_context(|| format!("Failed to write cache entry {:?}", temp_path))?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e).with_context(|| format!("Failed to replace cache entry {:?}", path));
        }

        Ok(())
    }

    /// Remove all entries. Returns the number deleted.
    pub fn clear(&self) -> Result<usize> {
        let mut count = 0;
        for path in self.entry_files()? {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete cache entry {:?}", path))?;
            count += 1;
        }
        self.prune_empty_dirs();
        Ok(count)
    }

    /// Gather statistics across all entries. Corrupt files count as expired.
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        let now = Utc::now();

        for path in self.entry_files()? {
            stats.total_entries += 1;
            if let Ok(meta) = fs::metadata(&path) {
                stats.total_size_bytes += meta.len();
            }

            let rel = path.strip_prefix(&self.cache_dir).unwrap_or(&path);
            let mut parts = rel.components().filter_map(|c| c.as_os_str().to_str());
            match (parts.next(), parts.next()) {
                (Some("tmdb"), Some("movies")) => stats.tmdb_movies += 1,
                (Some("tmdb"), Some("collections")) => stats.tmdb_collections += 1,
                (Some("tvdb"), Some("episodes")) => stats.tvdb_episodes += 1,
                _ => {}
            }

            let envelope: Option<Envelope<serde_json::Value>> = fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str(&c).ok());
            match envelope {
                Some(e) => {
                    let cached_at = e._cache_meta.cached_at;
                    if stats.oldest_entry.map_or(true, |o| cached_at < o) {
                        stats.oldest_entry = Some(cached_at);
                    }
                    if stats.newest_entry.map_or(true, |n| cached_at > n) {
                        stats.newest_entry = Some(cached_at);
                    }
                    if now >= e._cache_meta.expires_at {
                        stats.expired_entries += 1;
                    }
                }
                None => stats.expired_entries += 1,
            }
        }

        Ok(stats)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if self.cache_dir.exists() {
            collect_json_files(&self.cache_dir, &mut files)?;
        }
        Ok(files)
    }

    fn prune_empty_dirs(&self) {
        // Remove namespace/category dirs left empty after a clear; best effort.
        let Ok(namespaces) = fs::read_dir(&self.cache_dir) else {
            return;
        };
        for ns in namespaces.flatten() {
            if let Ok(categories) = fs::read_dir(ns.path()) {
                for cat in categories.flatten() {
                    let _ = fs::remove_dir(cat.path());
                }
            }
            let _ = fs::remove_dir(ns.path());
        }
    }
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "json") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn cache() -> (TempDir, Cache) {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path().to_path_buf());
        (dir, cache)
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let (_dir, cache) = cache();
        let value = json!({"name": "Alien Collection", "parts": [348, 679]});
        cache
            .set("tmdb", "collections", "8091", &value, 168, "Alien Collection")
            .unwrap();

        let got: Option<serde_json::Value> = cache.get("tmdb", "collections", "8091");
        assert_eq!(got, Some(value));
    }

    #[test]
    fn test_missing_key_is_none() {
        let (_dir, cache) = cache();
        let got: Option<serde_json::Value> = cache.get("tmdb", "movies", "42");
        assert!(got.is_none());
    }

    #[test]
    fn test_expired_entry_is_miss_and_deleted() {
        let (_dir, cache) = cache();
        // Zero-hour TTL expires immediately.
        cache
            .set("tvdb", "episodes", "7", &json!({"x": 1}), 0, "")
            .unwrap();

        let got: Option<serde_json::Value> = cache.get("tvdb", "episodes", "7");
        assert!(got.is_none());
        assert!(!cache.dir().join("tvdb/episodes/7.json").exists());
    }

    #[test]
    fn test_corrupt_entry_is_miss_and_deleted() {
        let (_dir, cache) = cache();
        let path = cache.dir().join("tmdb/movies");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("99.json"), "not json {{{").unwrap();

        let got: Option<serde_json::Value> = cache.get("tmdb", "movies", "99");
        assert!(got.is_none());
        assert!(!cache.dir().join("tmdb/movies/99.json").exists());
    }

    #[test]
    fn test_disabled_cache_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::disabled(dir.path().to_path_buf());
        cache
            .set("tmdb", "movies", "1", &json!({"a": 1}), 168, "")
            .unwrap();
        let got: Option<serde_json::Value> = cache.get("tmdb", "movies", "1");
        assert!(got.is_none());
        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_clear_counts_and_prunes() {
        let (_dir, cache) = cache();
        cache
            .set("tmdb", "movies", "1", &json!({}), 168, "")
            .unwrap();
        cache
            .set("tvdb", "episodes", "2", &json!({}), 24, "")
            .unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert_eq!(cache.clear().unwrap(), 0);
        assert!(!cache.dir().join("tmdb").exists());
    }

    #[test]
    fn test_stats_counts_by_category() {
        let (_dir, cache) = cache();
        cache
            .set("tmdb", "movies", "1", &json!({}), 168, "")
            .unwrap();
        cache
            .set("tmdb", "collections", "2", &json!({}), 168, "")
            .unwrap();
        cache
            .set("tvdb", "episodes", "3", &json!({}), 24, "")
            .unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.tmdb_movies, 1);
        assert_eq!(stats.tmdb_collections, 1);
        assert_eq!(stats.tvdb_episodes, 1);
        assert!(stats.total_size_bytes > 0);
        assert!(stats.oldest_entry.is_some());
        assert_eq!(stats.expired_entries, 0);
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let (_dir, cache) = cache();
        cache
            .set("tmdb", "movies", "1", &json!({"v": 1}), 168, "")
            .unwrap();
        cache
            .set("tmdb", "movies", "1", &json!({"v": 2}), 168, "")
            .unwrap();

        let got: Option<serde_json::Value> = cache.get("tmdb", "movies", "1");
        assert_eq!(got, Some(json!({"v": 2})));
        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }
}
