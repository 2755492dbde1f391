// Configuration: XDG-compliant paths plus a TOML config file with
// environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "gapscan";
const CONFIG_FILENAME: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Plex server connection
    pub plex: PlexConfig,

    /// TMDB credentials (movie scans)
    pub tmdb: TmdbConfig,

    /// TVDB credentials (episode scans)
    pub tvdb: TvdbConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// Scan behavior defaults
    pub options: OptionsConfig,

    /// Names to skip during scans
    pub exclusions: ExclusionsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlexConfig {
    /// Plex server base URL (default: http://localhost:32400)
    pub url: String,

    /// X-Plex-Token value
    pub token: Option<String>,
}

impl Default for PlexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:32400".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TvdbConfig {
    pub api_key: Option<String>,

    /// Subscriber PIN, only needed for user-supported keys
    pub pin: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override cache directory
    pub cache_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    /// Report unreleased/unaired items as missing (default: false)
    pub include_future: bool,

    /// Diff season 0 specials too (default: false)
    pub include_specials: bool,

    /// Suppress episodes that aired within this many hours (default: 48)
    pub recent_threshold_hours: i64,

    /// Smallest collection worth reporting (default: 2)
    pub min_collection_size: usize,

    /// Minimum owned members before a collection is reported (default: 1)
    pub min_owned: usize,

    /// Report shows with zero owned episodes (default: true)
    pub report_empty_series: bool,

    /// Concurrent catalog lookups per scan (default: 4)
    pub concurrency: usize,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            include_future: false,
            include_specials: false,
            recent_threshold_hours: 48,
            min_collection_size: 2,
            min_owned: 1,
            report_empty_series: true,
            concurrency: crate::gaps::DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExclusionsConfig {
    /// Show titles skipped by episode scans (case-insensitive)
    pub shows: Vec<String>,

    /// Collection names skipped by movie scans (case-insensitive)
    pub collections: Vec<String>,
}

/// Application paths following the XDG Base Directory Specification,
/// with platform fallbacks via the dirs crate.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// $XDG_CONFIG_HOME/gapscan or platform equivalent
    pub config_dir: PathBuf,

    /// $XDG_CACHE_HOME/gapscan or platform equivalent
    pub cache_dir: PathBuf,
}

impl AppPaths {
    /// Resolve paths. Priority: env var, config file override, XDG dir,
    /// current directory.
    pub fn new(overrides: &PathsConfig) -> Self {
        Self {
            config_dir: Self::resolve(
                "GAPSCAN_CONFIG_DIR",
                &overrides.config_dir,
                dirs::config_dir(),
            ),
            cache_dir: Self::resolve(
                "GAPSCAN_CACHE_DIR",
                &overrides.cache_dir,
                dirs::cache_dir(),
            ),
        }
    }

    fn resolve(env_var: &str, config_override: &Option<PathBuf>, xdg: Option<PathBuf>) -> PathBuf {
        if let Ok(path) = std::env::var(env_var) {
            return PathBuf::from(path);
        }
        if let Some(path) = config_override {
            return path.clone();
        }
        if let Some(dir) = xdg {
            return dir.join(APP_NAME);
        }
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(format!(".{}", APP_NAME))
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILENAME)
    }

    pub fn log_paths(&self) {
        tracing::debug!("Configuration directory: {}", self.config_dir.display());
        tracing::debug!("Cache directory: {}", self.cache_dir.display());
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new(&PathsConfig::default())
    }
}

/// Merged configuration: TOML file plus environment overrides.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: AppPaths,
    pub plex_url: String,
    pub plex_token: Option<String>,
    pub tmdb_api_key: Option<String>,
    pub tvdb_api_key: Option<String>,
    pub tvdb_pin: Option<String>,
    pub options: OptionsConfig,
    pub exclusions: ExclusionsConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        let config_dir = Self::find_config_dir();
        let config_file = Self::load_config_file(&config_dir);
        Self::build(config_file)
    }

    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("GAPSCAN_CONFIG_DIR") {
            return PathBuf::from(path);
        }
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn load_config_file(config_dir: &Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::debug!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    fn build(config_file: ConfigFile) -> Self {
        let paths = AppPaths::new(&config_file.paths);

        let plex_url = std::env::var("PLEX_URL")
            .ok()
            .unwrap_or_else(|| config_file.plex.url.clone());
        let plex_token = std::env::var("PLEX_TOKEN").ok().or(config_file.plex.token);
        let tmdb_api_key = std::env::var("TMDB_API_KEY")
            .ok()
            .or(config_file.tmdb.api_key);
        let tvdb_api_key = std::env::var("TVDB_API_KEY")
            .ok()
            .or(config_file.tvdb.api_key);
        let tvdb_pin = std::env::var("TVDB_PIN").ok().or(config_file.tvdb.pin);

        Self {
            paths,
            plex_url,
            plex_token,
            tmdb_api_key,
            tvdb_api_key,
            tvdb_pin,
            options: config_file.options,
            exclusions: config_file.exclusions,
        }
    }

    /// Default config file contents, written by `config init`.
    pub fn template() -> &'static str {
        r#"# gapscan configuration

[plex]
url = "http://localhost:32400"
# token = "your-plex-token"

[tmdb]
# api_key = "your-tmdb-api-key"

[tvdb]
# api_key = "your-tvdb-api-key"
# pin = "your-subscriber-pin"

[options]
include_future = false
include_specials = false
recent_threshold_hours = 48
min_collection_size = 2
min_owned = 1
report_empty_series = true
concurrency = 4

[exclusions]
shows = []
collections = []
"#
    }
}
