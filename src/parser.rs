// Filename parsing for multi-episode files.
//
// Plex reports a multi-episode file ("Show S02E01-E02.mkv") as a single
// item, so the extra episodes have to be recovered from the filename.
// Supported formats, case-insensitive, zero-padded or not:
// - "Show S02E01.mkv"       -> [(2,1)]
// - "Show S02E01E02.mkv"    -> [(2,1),(2,2)]
// - "Show S02E01-02.mkv"    -> [(2,1),(2,2)]
// - "Show S02E01-E02.mkv"   -> [(2,1),(2,2)]

use crate::models::OwnedEpisode;
use regex::Regex;
use std::sync::LazyLock;

static RE_SEASON_EP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)S(\d{1,2})E(\d{1,3})((?:-?E\d{1,3}|-\d{1,3})*)").unwrap());
static RE_EP_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)-?E?(\d{1,3})").unwrap());

/// Widest believable multi-episode file. A range spanning this many
/// episodes or more means the trailing number was release noise
/// ("E01-1080") rather than a real endpoint.
const MAX_RANGE_SPAN: u32 = 20;

/// Extract the (season, episode) pairs a filename covers, in order.
///
/// A range is expanded to every episode between its endpoints inclusive.
/// Returns an empty vec for unparseable names or descending ranges; the
/// caller tallies those as skipped.
pub fn parse_episodes(filename: &str) -> Vec<OwnedEpisode> {
    let name = filename
        .rsplit_once('.')
        .map(|(name, _)| name)
        .unwrap_or(filename);

    let Some(caps) = RE_SEASON_EP.captures(name) else {
        return Vec::new();
    };

    let Some(season) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
        return Vec::new();
    };
    let Some(start) = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()) else {
        return Vec::new();
    };

    let mut end = start;
    if let Some(tail) = caps.get(3) {
        for cont in RE_EP_CONTINUATION.captures_iter(tail.as_str()) {
            let Some(n) = cont.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                return Vec::new();
            };
            // Descending ranges are a parse failure, not a negative range.
            if n < end {
                return Vec::new();
            }
            end = n;
        }
    }

    if end - start >= MAX_RANGE_SPAN {
        return Vec::new();
    }

    (start..=end)
        .map(|episode| OwnedEpisode { season, episode })
        .collect()
}
