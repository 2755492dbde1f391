// Command-line surface: argument parsing, command dispatch, and report
// rendering (text, JSON, CSV).

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write as _;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::cache::Cache;
use crate::config::AppConfig;
use crate::gaps::episodes::{EpisodeGapFinder, EpisodeGapOptions};
use crate::gaps::movies::{MovieGapFinder, MovieGapOptions};
use crate::models::{EpisodeGapReport, MovieGapReport};
use crate::retry::RetryPolicy;
use crate::services::plex::PlexClient;
use crate::services::tmdb::TmdbClient;
use crate::services::tvdb::TvdbClient;

/// How many missing episodes a season lists in text output before
/// truncating (lifted by --verbose).
const TEXT_EPISODE_CAP: usize = 5;

#[derive(Debug, Parser)]
#[command(name = "gapscan")]
#[command(version, about = "Find missing movies and episodes in a Plex library")]
pub struct Cli {
    /// Full missing lists and debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan movie libraries for missing collection members
    Movies(ScanArgs),

    /// Scan TV libraries for missing episodes
    Episodes(ScanArgs),

    /// Run the movie and episode scans back to back
    Scan(ScanArgs),

    /// Inspect or empty the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show or bootstrap the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// Entry counts, sizes, and ages per category
    Stats,
    /// Delete every cached response
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the merged configuration (secrets masked)
    Show,
    /// Write a commented default config file
    Init,
}

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Only scan libraries with these names (repeatable)
    #[arg(short, long)]
    pub library: Vec<String>,

    /// Report unreleased movies and unaired episodes as missing
    #[arg(long)]
    pub include_future: bool,

    /// Diff season 0 specials too
    #[arg(long)]
    pub include_specials: bool,

    /// Hours after airing before an episode counts as missing
    #[arg(long, value_name = "HOURS")]
    pub recent_threshold: Option<i64>,

    /// Smallest collection worth reporting
    #[arg(long, value_name = "N")]
    pub min_collection_size: Option<usize>,

    /// Minimum owned members before a collection is reported
    #[arg(long, value_name = "N")]
    pub min_owned: Option<usize>,

    /// Skip a show by title (repeatable, merged with config exclusions)
    #[arg(long = "exclude-show", value_name = "TITLE")]
    pub exclude_shows: Vec<String>,

    /// Skip a collection by name (repeatable)
    #[arg(long = "exclude-collection", value_name = "NAME")]
    pub exclude_collections: Vec<String>,

    /// Do not report shows with zero owned episodes
    #[arg(long)]
    pub skip_empty_series: bool,

    /// Bypass the on-disk response cache
    #[arg(long)]
    pub no_cache: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Skip the automatic CSV export after a text-mode scan
    #[arg(long)]
    pub no_csv: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

pub async fn run(cli: Cli, config: AppConfig, cancel: CancellationToken) -> Result<()> {
    match cli.command {
        Commands::Movies(args) => scan_movies(&args, &config, cli.quiet, &cancel).await,
        Commands::Episodes(args) => {
            scan_episodes(&args, &config, cli.verbose, cli.quiet, &cancel).await
        }
        Commands::Scan(args) => {
            scan_movies(&args, &config, cli.quiet, &cancel).await?;
            if cancel.is_cancelled() {
                return Ok(());
            }
            scan_episodes(&args, &config, cli.verbose, cli.quiet, &cancel).await
        }
        Commands::Cache { command } => run_cache(command, &config),
        Commands::Config { command } => run_config(command, &config),
    }
}

fn build_cache(args: &ScanArgs, config: &AppConfig) -> Cache {
    if args.no_cache {
        Cache::disabled(config.paths.cache_dir.clone())
    } else {
        Cache::new(config.paths.cache_dir.clone())
    }
}

fn plex_client(config: &AppConfig) -> Result<PlexClient> {
    let token = config
        .plex_token
        .clone()
        .context("Plex token not configured (set PLEX_TOKEN or [plex] token)")?;
    PlexClient::new(config.plex_url.clone(), token)
}

/// Select libraries of a section type, honoring the --library filter.
async fn select_libraries(
    plex: &PlexClient,
    section_type: &str,
    filter: &[String],
) -> Result<Vec<crate::services::plex::PlexLibrary>> {
    let mut libraries = plex.libraries(section_type).await?;
    if !filter.is_empty() {
        libraries.retain(|lib| {
            filter
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&lib.title))
        });
    }
    for lib in &libraries {
        tracing::debug!("Matched {} library: {}", lib.library_type, lib.title);
    }
    Ok(libraries)
}

fn scan_progress(quiet: bool, format: OutputFormat) -> (Option<ProgressBar>, Option<Box<crate::gaps::ProgressFn>>) {
    // Progress belongs to interactive text mode only; JSON/CSV output
    // must stay clean for piping.
    if quiet || format != OutputFormat::Text {
        return (None, None);
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{msg:<34} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    let cb = pb.clone();
    let progress: Box<crate::gaps::ProgressFn> = Box::new(move |stage, current, total| {
        cb.set_length(total);
        cb.set_message(stage.to_string());
        cb.set_position(current);
    });
    (Some(pb), Some(progress))
}

async fn scan_movies(
    args: &ScanArgs,
    config: &AppConfig,
    quiet: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let api_key = config
        .tmdb_api_key
        .clone()
        .context("TMDB API key not configured (set TMDB_API_KEY or [tmdb] api_key)")?;
    let tmdb = TmdbClient::new(api_key, build_cache(args, config), RetryPolicy::default())
        .context("Failed to build TMDB client")?;
    tmdb.verify().await.context("TMDB API key verification failed")?;

    let plex = plex_client(config)?;
    plex.connect().await.context("Plex server unreachable")?;
    let libraries = select_libraries(&plex, "movie", &args.library).await?;
    if libraries.is_empty() {
        anyhow::bail!("No movie libraries matched");
    }

    let mut excluded = config.exclusions.collections.clone();
    excluded.extend(args.exclude_collections.iter().cloned());

    let options = MovieGapOptions {
        include_future: args.include_future || config.options.include_future,
        min_collection_size: args
            .min_collection_size
            .unwrap_or(config.options.min_collection_size),
        min_owned: args.min_owned.unwrap_or(config.options.min_owned),
        excluded_collections: excluded,
        concurrency: config.options.concurrency,
    };

    for library in &libraries {
        tracing::info!("Scanning movie library: {}", library.title);
        let snapshot = plex
            .snapshot_movies(library)
            .await
            .with_context(|| format!("Failed to read library '{}'", library.title))?;

        let (pb, progress) = scan_progress(quiet, args.format);
        let mut finder =
            MovieGapFinder::new(&tmdb, options.clone()).with_cancellation(cancel.clone());
        if let Some(progress) = progress {
            finder = finder.with_progress(progress);
        }
        let report = finder.find_gaps(&library.title, &snapshot).await?;
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        emit_movie_report(&report, args)?;
        if report.cancelled {
            break;
        }
    }
    Ok(())
}

async fn scan_episodes(
    args: &ScanArgs,
    config: &AppConfig,
    verbose: bool,
    quiet: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let api_key = config
        .tvdb_api_key
        .clone()
        .context("TVDB API key not configured (set TVDB_API_KEY or [tvdb] api_key)")?;
    let tvdb = TvdbClient::new(
        api_key,
        config.tvdb_pin.clone(),
        build_cache(args, config),
        RetryPolicy::default(),
    )
    .context("Failed to build TVDB client")?;
    tvdb.verify().await.context("TVDB login failed")?;

    let plex = plex_client(config)?;
    plex.connect().await.context("Plex server unreachable")?;
    let libraries = select_libraries(&plex, "show", &args.library).await?;
    if libraries.is_empty() {
        anyhow::bail!("No TV libraries matched");
    }

    let mut excluded = config.exclusions.shows.clone();
    excluded.extend(args.exclude_shows.iter().cloned());

    let options = EpisodeGapOptions {
        include_future: args.include_future || config.options.include_future,
        include_specials: args.include_specials || config.options.include_specials,
        recent_threshold_hours: args
            .recent_threshold
            .unwrap_or(config.options.recent_threshold_hours),
        excluded_shows: excluded,
        report_empty_series: !args.skip_empty_series && config.options.report_empty_series,
        concurrency: config.options.concurrency,
    };

    for library in &libraries {
        tracing::info!("Scanning TV library: {}", library.title);
        let snapshot = plex
            .snapshot_shows(library)
            .await
            .with_context(|| format!("Failed to read library '{}'", library.title))?;

        let (pb, progress) = scan_progress(quiet, args.format);
        let mut finder =
            EpisodeGapFinder::new(&tvdb, options.clone()).with_cancellation(cancel.clone());
        if let Some(progress) = progress {
            finder = finder.with_progress(progress);
        }
        let report = finder.find_gaps(&library.title, &snapshot).await?;
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        emit_episode_report(&report, args, verbose)?;
        if report.cancelled {
            break;
        }
    }
    Ok(())
}

// === Report output ===

fn emit_movie_report(report: &MovieGapReport, args: &ScanArgs) -> Result<()> {
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            write_movie_csv(&mut writer, report)?;
        }
        OutputFormat::Text => {
            print!("{}", render_movie_text(report));
            if !args.no_csv && report.total_missing() > 0 {
                let path = csv_export_path(&report.library_name, "movie_gaps");
                let mut writer = csv::Writer::from_path(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                write_movie_csv(&mut writer, report)?;
                println!("CSV saved to {}", path.display());
            }
        }
    }
    Ok(())
}

fn emit_episode_report(report: &EpisodeGapReport, args: &ScanArgs, verbose: bool) -> Result<()> {
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            write_episode_csv(&mut writer, report)?;
        }
        OutputFormat::Text => {
            print!("{}", render_episode_text(report, verbose));
            if !args.no_csv && report.total_missing() > 0 {
                let path = csv_export_path(&report.library_name, "episode_gaps");
                let mut writer = csv::Writer::from_path(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                write_episode_csv(&mut writer, report)?;
                println!("CSV saved to {}", path.display());
            }
        }
    }
    Ok(())
}

fn csv_export_path(library_name: &str, kind: &str) -> PathBuf {
    let safe: String = library_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    PathBuf::from(format!(
        "{}_{}_{}.csv",
        safe,
        kind,
        Utc::now().format("%Y%m%d")
    ))
}

fn render_movie_text(report: &MovieGapReport) -> String {
    let mut out = String::new();
    use std::fmt::Write;

    let _ = writeln!(out, "=== Movie gaps: {} ===", report.library_name);
    let _ = writeln!(
        out,
        "Movies scanned: {} ({} with TMDB id, {} in collections)",
        report.movies_scanned, report.movies_with_tmdb_id, report.movies_in_collections
    );
    let _ = writeln!(
        out,
        "Collections: {} ({} complete, {} with gaps)",
        report.unique_collections,
        report.complete_collections(),
        report.collections_with_gaps.len()
    );
    if report.skipped.total() > 0 {
        let _ = writeln!(
            out,
            "Skipped: {} (no id {}, lookup failed {}, excluded {})",
            report.skipped.total(),
            report.skipped.no_external_id,
            report.skipped.lookup_failed,
            report.skipped.excluded
        );
    }

    for gap in &report.collections_with_gaps {
        let _ = writeln!(
            out,
            "\n{} ({}/{} owned, {:.1}% complete)",
            gap.collection_name,
            gap.owned_movies,
            gap.total_movies,
            gap.completion_percent()
        );
        for movie in &gap.missing_movies {
            let date = movie
                .release_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "unreleased".to_string());
            let _ = writeln!(out, "  - {} ({})", movie.title, date);
        }
    }

    let _ = writeln!(out, "\nTotal missing: {}", report.total_missing());
    if report.cancelled {
        let _ = writeln!(out, "*** Scan interrupted; results are partial ***");
    }
    out
}

fn render_episode_text(report: &EpisodeGapReport, verbose: bool) -> String {
    let mut out = String::new();
    use std::fmt::Write;

    let _ = writeln!(out, "=== Episode gaps: {} ===", report.library_name);
    let _ = writeln!(
        out,
        "Shows scanned: {} ({} with TVDB id, {} episodes on disk)",
        report.shows_scanned, report.shows_with_tvdb_id, report.episodes_owned
    );
    let _ = writeln!(out, "Shows with gaps: {}", report.shows_with_gaps.len());
    if report.skipped.total() > 0 {
        let _ = writeln!(
            out,
            "Skipped: {} (no id {}, unparsed {}, lookup failed {}, excluded {}, empty series {})",
            report.skipped.total(),
            report.skipped.no_external_id,
            report.skipped.unparsed,
            report.skipped.lookup_failed,
            report.skipped.excluded,
            report.skipped.empty_series
        );
    }

    for show in &report.shows_with_gaps {
        let _ = writeln!(
            out,
            "\n{} ({}/{} episodes, {:.1}% complete)",
            show.show_title,
            show.owned_episodes,
            show.total_episodes,
            show.completion_percent()
        );
        for season in &show.seasons_with_gaps {
            let _ = writeln!(
                out,
                "  Season {} ({}/{} owned):",
                season.season, season.owned_episodes, season.total_episodes
            );
            let cap = if verbose {
                season.missing_episodes.len()
            } else {
                TEXT_EPISODE_CAP
            };
            for episode in season.missing_episodes.iter().take(cap) {
                let title = episode.title.as_deref().unwrap_or("TBA");
                match episode.aired {
                    Some(aired) => {
                        let _ = writeln!(
                            out,
                            "    {} - {} (aired {})",
                            episode.episode_code(),
                            title,
                            aired
                        );
                    }
                    None => {
                        let _ = writeln!(out, "    {} - {}", episode.episode_code(), title);
                    }
                }
            }
            let hidden = season.missing_episodes.len().saturating_sub(cap);
            if hidden > 0 {
                let _ = writeln!(out, "    ... and {} more (use --verbose)", hidden);
            }
        }
    }

    let _ = writeln!(out, "\nTotal missing: {}", report.total_missing());
    if report.cancelled {
        let _ = writeln!(out, "*** Scan interrupted; results are partial ***");
    }
    out
}

fn write_movie_csv<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    report: &MovieGapReport,
) -> Result<()> {
    writer.write_record([
        "collection",
        "title",
        "year",
        "release_date",
        "tmdb_id",
        "owned",
        "total",
    ])?;
    for gap in &report.collections_with_gaps {
        for movie in &gap.missing_movies {
            writer.write_record([
                gap.collection_name.as_str(),
                movie.title.as_str(),
                &movie.year.map(|y| y.to_string()).unwrap_or_default(),
                &movie
                    .release_date
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                &movie.tmdb_id.to_string(),
                &gap.owned_movies.to_string(),
                &gap.total_movies.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_episode_csv<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    report: &EpisodeGapReport,
) -> Result<()> {
    writer.write_record([
        "show",
        "code",
        "season",
        "episode",
        "title",
        "aired",
        "tvdb_id",
    ])?;
    for show in &report.shows_with_gaps {
        for season in &show.seasons_with_gaps {
            for episode in &season.missing_episodes {
                writer.write_record([
                    show.show_title.as_str(),
                    &episode.episode_code(),
                    &episode.season.to_string(),
                    &episode.episode.to_string(),
                    episode.title.as_deref().unwrap_or(""),
                    &episode.aired.map(|d| d.to_string()).unwrap_or_default(),
                    &episode.tvdb_id.to_string(),
                ])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

// === Cache and config commands ===

fn run_cache(command: CacheCommands, config: &AppConfig) -> Result<()> {
    let cache = Cache::new(config.paths.cache_dir.clone());
    match command {
        CacheCommands::Stats => {
            let stats = cache.stats()?;
            println!("Cache directory: {}", cache.dir().display());
            println!(
                "Entries: {} ({:.1} KB, {} expired)",
                stats.total_entries,
                stats.total_size_kb(),
                stats.expired_entries
            );
            println!("  TMDB movie memberships: {}", stats.tmdb_movies);
            println!("  TMDB collections:       {}", stats.tmdb_collections);
            println!("  TVDB episode lists:     {}", stats.tvdb_episodes);
            if let Some(oldest) = stats.oldest_entry {
                println!("Oldest entry: {}", oldest.format("%Y-%m-%d %H:%M UTC"));
            }
            if let Some(newest) = stats.newest_entry {
                println!("Newest entry: {}", newest.format("%Y-%m-%d %H:%M UTC"));
            }
        }
        CacheCommands::Clear => {
            let removed = cache.clear()?;
            println!("Removed {} cache entries", removed);
        }
    }
    Ok(())
}

fn mask(secret: &Option<String>) -> String {
    match secret {
        Some(s) if s.chars().count() > 4 => {
            format!("{}****", s.chars().take(4).collect::<String>())
        }
        Some(_) => "****".to_string(),
        None => "(not set)".to_string(),
    }
}

fn run_config(command: ConfigCommands, config: &AppConfig) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            println!("Config file: {}", config.paths.config_file_path().display());
            println!("Cache dir:   {}", config.paths.cache_dir.display());
            println!();
            println!("[plex]");
            println!("url = {}", config.plex_url);
            println!("token = {}", mask(&config.plex_token));
            println!("[tmdb]");
            println!("api_key = {}", mask(&config.tmdb_api_key));
            println!("[tvdb]");
            println!("api_key = {}", mask(&config.tvdb_api_key));
            println!("pin = {}", mask(&config.tvdb_pin));
            println!("[options]");
            println!("include_future = {}", config.options.include_future);
            println!("include_specials = {}", config.options.include_specials);
            println!(
                "recent_threshold_hours = {}",
                config.options.recent_threshold_hours
            );
            println!(
                "min_collection_size = {}",
                config.options.min_collection_size
            );
            println!("min_owned = {}", config.options.min_owned);
            println!(
                "report_empty_series = {}",
                config.options.report_empty_series
            );
            println!("concurrency = {}", config.options.concurrency);
            println!("[exclusions]");
            println!("shows = {:?}", config.exclusions.shows);
            println!("collections = {:?}", config.exclusions.collections);
        }
        ConfigCommands::Init => {
            let path = config.paths.config_file_path();
            if path.exists() {
                anyhow::bail!("Config file already exists at {}", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let mut file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            file.write_all(AppConfig::template().as_bytes())?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CollectionGap, MissingEpisode, MissingMovie, SeasonGap, ShowGap, SkippedTally,
    };
    use chrono::NaiveDate;

    fn movie_report() -> MovieGapReport {
        MovieGapReport {
            library_name: "Movies".into(),
            movies_scanned: 10,
            movies_with_tmdb_id: 9,
            movies_in_collections: 4,
            unique_collections: 2,
            collections_with_gaps: vec![CollectionGap {
                collection_id: 1,
                collection_name: "Alien Collection".into(),
                total_movies: 3,
                owned_movies: 1,
                missing_movies: vec![MissingMovie {
                    tmdb_id: 679,
                    title: "Aliens".into(),
                    year: Some(1986),
                    release_date: NaiveDate::from_ymd_opt(1986, 7, 18),
                }],
            }],
            skipped: SkippedTally::default(),
            cancelled: false,
        }
    }

    fn episode_report(missing_in_season: usize) -> EpisodeGapReport {
        let missing: Vec<MissingEpisode> = (2..2 + missing_in_season as u32)
            .map(|n| MissingEpisode {
                tvdb_id: n as i64,
                season: 1,
                episode: n,
                title: Some(format!("Episode {}", n)),
                aired: NaiveDate::from_ymd_opt(2020, 1, n as u32),
            })
            .collect();
        EpisodeGapReport {
            library_name: "TV".into(),
            shows_scanned: 1,
            shows_with_tvdb_id: 1,
            episodes_owned: 1,
            shows_with_gaps: vec![ShowGap {
                tvdb_id: 10,
                show_title: "Show".into(),
                total_episodes: 1 + missing_in_season,
                owned_episodes: 1,
                seasons_with_gaps: vec![SeasonGap {
                    season: 1,
                    total_episodes: 1 + missing_in_season,
                    owned_episodes: 1,
                    missing_episodes: missing,
                }],
            }],
            skipped: SkippedTally::default(),
            cancelled: false,
        }
    }

    #[test]
    fn test_movie_text_lists_missing_by_collection() {
        let text = render_movie_text(&movie_report());
        assert!(text.contains("Alien Collection (1/3 owned, 33.3% complete)"));
        assert!(text.contains("- Aliens (1986-07-18)"));
        assert!(text.contains("Total missing: 1"));
    }

    #[test]
    fn test_episode_text_caps_listing() {
        let text = render_episode_text(&episode_report(8), false);
        assert!(text.contains("S01E02"));
        assert!(text.contains("S01E06"));
        assert!(!text.contains("S01E07"));
        assert!(text.contains("... and 3 more"));
    }

    #[test]
    fn test_episode_text_verbose_shows_all() {
        let text = render_episode_text(&episode_report(8), true);
        assert!(text.contains("S01E09"));
        assert!(!text.contains("more (use --verbose)"));
    }

    #[test]
    fn test_cancelled_report_flagged() {
        let mut report = movie_report();
        report.cancelled = true;
        let text = render_movie_text(&report);
        assert!(text.contains("results are partial"));
    }

    #[test]
    fn test_movie_csv_rows() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_movie_csv(&mut writer, &movie_report()).unwrap();
        let data = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let mut lines = data.lines();
        assert_eq!(
            lines.next().unwrap(),
            "collection,title,year,release_date,tmdb_id,owned,total"
        );
        assert_eq!(
            lines.next().unwrap(),
            "Alien Collection,Aliens,1986,1986-07-18,679,1,3"
        );
    }

    #[test]
    fn test_episode_csv_rows() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_episode_csv(&mut writer, &episode_report(1)).unwrap();
        let data = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(data.contains("Show,S01E02,1,2,Episode 2,2020-01-02,2"));
    }

    #[test]
    fn test_csv_export_path_sanitized() {
        let path = csv_export_path("My Movies!", "movie_gaps");
        let name = path.to_string_lossy().into_owned();
        assert!(name.starts_with("My_Movies__movie_gaps_"));
        assert!(name.ends_with(".csv"));
    }

    #[test]
    fn test_cli_parses_scan_flags() {
        let cli = Cli::try_parse_from([
            "gapscan",
            "episodes",
            "--library",
            "TV",
            "--include-specials",
            "--recent-threshold",
            "72",
            "--exclude-show",
            "Talk Show",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Episodes(args) => {
                assert_eq!(args.library, vec!["TV"]);
                assert!(args.include_specials);
                assert_eq!(args.recent_threshold, Some(72));
                assert_eq!(args.exclude_shows, vec!["Talk Show"]);
                assert_eq!(args.format, OutputFormat::Json);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_mask_hides_secret() {
        assert_eq!(mask(&Some("abcdef123".into())), "abcd****");
        assert_eq!(mask(&Some("ab".into())), "****");
        assert_eq!(mask(&None), "(not set)");
    }

    #[test]
    fn test_mask_handles_multibyte_secret() {
        assert_eq!(mask(&Some("tøkén-value".into())), "tøké****");
        assert_eq!(mask(&Some("çœür".into())), "****");
    }
}
