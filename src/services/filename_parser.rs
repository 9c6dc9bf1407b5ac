//! Parser for scene-style release names
//!
//! Parses names like:
//! - "Chicago.Fire.S14E08.1080p.WEB.h264-ETHEL"
//! - "Show.Name.S01E02E03.720p.HDTV.x264-GRP" (multi-episode)
//! - "Show Name S02 1080p BluRay x264-GRP" (season pack)
//! - "The.Daily.Show.2026.01.07.Guest.720p.WEB.h264-EDITH" (air-by-date)
//! - "[SubGroup] Show Name - S01E05v2 [720p]"

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Episode information extracted from a release name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRelease {
    pub original_name: String,
    pub show_name: String,
    pub season: Option<i32>,
    /// Episode numbers; empty for season packs and air-by-date releases
    pub episodes: Vec<i32>,
    pub air_date: Option<NaiveDate>,
    pub release_group: Option<String>,
    /// Lowercased `proper`, `repack`, `real`, `rerip` tokens found in the name
    pub proper_tags: Vec<String>,
    /// Release version (`v2`), -1 when absent
    pub version: i32,
}

impl ParsedRelease {
    pub fn is_season_pack(&self) -> bool {
        self.season.is_some() && self.episodes.is_empty()
    }

    pub fn is_proper(&self) -> bool {
        !self.proper_tags.is_empty()
    }
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("valid release regex"));
    };
}

pattern!(LEADING_GROUP, r"^\s*\[([^\]]+)\]\s*");
pattern!(SXXEXX, r"(?i)(?:^|[ ._\-\[(])s(\d{1,3})[ ._]?e(\d{1,3})");
// A bare number only counts right after `-`, so `S01E02.24.Hours` stays one episode
pattern!(EXTRA_EPISODE, r"(?i)^[ ._]?(?:(-)[ ._]?e?(\d{1,3})|e(\d{1,3}))(?:v\d)?(?:[ ._\-\])]|$)");
pattern!(NXNN, r"(?i)(?:^|[ ._\-\[(])(\d{1,2})x(\d{2,3})(?:[ ._\-\])]|$)");
pattern!(AIR_DATE, r"(?:^|[ ._\-(])(\d{4})[ ._-](\d{2})[ ._-](\d{2})(?:[ ._\-)]|$)");
pattern!(SEASON_PACK, r"(?i)(?:^|[ ._\-\[(])(?:s(\d{1,3})|season[ ._]?(\d{1,3}))(?:[ ._\-\])]|$)");
pattern!(VERSION, r"(?i)(?:e\d{1,3}|\d)v(\d)(?:[ ._\-\])]|$)");
pattern!(TRAILING_GROUP, r"-([A-Za-z0-9]+)(?:\.(?:nzb|torrent|mkv|mp4|avi))?$");
pattern!(MULTI_SPACE, r"\s+");
pattern!(NON_ALNUM, r"[^a-z0-9\s]");
pattern!(TRAILING_YEAR, r"\s+(19\d{2}|20\d{2})$");

const PROPER_TAGS: [&str; 4] = ["proper", "repack", "real", "rerip"];

/// Parse a release name. Returns `None` when no season, episode or air date
/// can be found.
pub fn parse_release(title: &str) -> Option<ParsedRelease> {
    let trimmed = title.trim();
    let mut release = ParsedRelease {
        original_name: trimmed.to_string(),
        version: -1,
        ..Default::default()
    };

    let (leading_group, body) = match LEADING_GROUP.captures(trimmed) {
        Some(caps) => {
            let whole = caps.get(0).map_or(0, |m| m.end());
            (caps.get(1).map(|m| m.as_str().to_string()), &trimmed[whole..])
        }
        None => (None, trimmed),
    };

    let name_end = if let Some(caps) = SXXEXX.captures(body) {
        let whole = caps.get(0)?;
        release.season = caps.get(1)?.as_str().parse().ok();
        let first: i32 = caps.get(2)?.as_str().parse().ok()?;
        release.episodes = collect_episodes(first, &body[whole.end()..]);
        whole.start()
    } else if let Some(caps) = NXNN.captures(body) {
        let whole = caps.get(0)?;
        release.season = caps.get(1)?.as_str().parse().ok();
        release.episodes = vec![caps.get(2)?.as_str().parse().ok()?];
        whole.start()
    } else if let Some((start, date)) = find_air_date(body) {
        release.air_date = Some(date);
        start
    } else if let Some(caps) = SEASON_PACK.captures(body) {
        let whole = caps.get(0)?;
        let season = caps.get(1).or_else(|| caps.get(2))?;
        release.season = season.as_str().parse().ok();
        whole.start()
    } else {
        debug!(title, "Release name has no episode information");
        return None;
    };

    release.show_name = clean_show_name(&body[..name_end]);

    // Only the part after the episode token, so a show called "The Real ..." is not a proper
    release.proper_tags = body[name_end..]
        .split([' ', '.', '_', '-'])
        .map(str::to_lowercase)
        .filter(|token| PROPER_TAGS.contains(&token.as_str()))
        .collect();

    release.version = VERSION
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(-1);

    release.release_group = leading_group.or_else(|| {
        TRAILING_GROUP
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    });

    debug!(
        title,
        show = %release.show_name,
        season = ?release.season,
        episodes = ?release.episodes,
        group = ?release.release_group,
        "Parsed release name"
    );

    Some(release)
}

/// Follow-up episode numbers after the first `SxxEyy` token: `E03`, `-E04`, `-04`
fn collect_episodes(first: i32, mut rest: &str) -> Vec<i32> {
    let mut episodes = vec![first];
    let mut last = first;

    while let Some(caps) = EXTRA_EPISODE.captures(rest) {
        let Some(digits) = caps.get(2).or_else(|| caps.get(3)) else {
            break;
        };
        let Ok(number) = digits.as_str().parse::<i32>() else {
            break;
        };
        if number <= last {
            break;
        }
        let is_range = caps.get(1).is_some();
        if is_range {
            episodes.extend(last + 1..=number);
        } else {
            episodes.push(number);
        }
        last = number;

        // Do not consume the trailing separator so the next token can match
        rest = &rest[digits.end()..];
    }

    episodes
}

fn find_air_date(body: &str) -> Option<(usize, NaiveDate)> {
    let caps = AIR_DATE.captures(body)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some((caps.get(0)?.start(), date))
}

/// Turn the raw prefix of a release name into a readable show name
fn clean_show_name(name: &str) -> String {
    let spaced = name.replace(['.', '_'], " ");
    let trimmed = spaced.trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '[' || c == '(');
    MULTI_SPACE.replace_all(trimmed, " ").trim().to_string()
}

/// Normalize a show name for comparison
pub fn normalize_show_name(name: &str) -> String {
    let mut normalized = name
        .to_lowercase()
        .replace('&', " and ")
        .replace(['.', '_', '-'], " ");

    // Remove articles from the beginning
    for article in ["the ", "a ", "an "] {
        if let Some(rest) = normalized.strip_prefix(article) {
            normalized = rest.to_string();
        }
    }

    let normalized = NON_ALNUM.replace_all(&normalized, "");
    MULTI_SPACE.replace_all(&normalized, " ").trim().to_string()
}

/// Whether a parsed release name refers to a show, by name or alias.
///
/// A trailing year is ignored on either side so `Doctor Who (2005)` matches
/// `Doctor.Who.S01E01`.
pub fn show_name_matches(show_name: &str, aliases: &[String], candidate: &str) -> bool {
    let candidate = normalize_show_name(candidate);
    if candidate.is_empty() {
        return false;
    }
    let candidate_no_year = TRAILING_YEAR.replace(&candidate, "").to_string();

    std::iter::once(show_name)
        .chain(aliases.iter().map(String::as_str))
        .map(normalize_show_name)
        .any(|name| {
            name == candidate || TRAILING_YEAR.replace(&name, "") == candidate_no_year.as_str()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_sxxexx() {
        let result = parse_release("Chicago.Fire.S14E08.1080p.WEB.h264-ETHEL").unwrap();
        assert_eq!(result.show_name, "Chicago Fire");
        assert_eq!(result.season, Some(14));
        assert_eq!(result.episodes, vec![8]);
        assert_eq!(result.release_group.as_deref(), Some("ETHEL"));
        assert!(!result.is_proper());
        assert_eq!(result.version, -1);
    }

    #[test]
    fn test_parse_multi_episode() {
        let result = parse_release("Show.Name.S01E02E03.720p.HDTV.x264-GRP").unwrap();
        assert_eq!(result.episodes, vec![2, 3]);

        let result = parse_release("Show.Name.S01E02-E04.720p.HDTV.x264-GRP").unwrap();
        assert_eq!(result.episodes, vec![2, 3, 4]);

        let result = parse_release("Show Name S01E05-06 1080p WEB-DL").unwrap();
        assert_eq!(result.episodes, vec![5, 6]);
    }

    #[test]
    fn test_resolution_is_not_an_episode() {
        let result = parse_release("Show.Name.S01E02-720p-GRP").unwrap();
        assert_eq!(result.episodes, vec![2]);
    }

    #[test]
    fn test_bare_numbers_after_episode_are_not_episodes() {
        let result = parse_release("Show.Name.S01E02.24.Hours.720p.HDTV.x264-GRP").unwrap();
        assert_eq!(result.episodes, vec![2]);

        let result = parse_release("Show.Name.S01E02.5.1.AAC.720p-GRP").unwrap();
        assert_eq!(result.episodes, vec![2]);

        let result = parse_release("Show.Name.S01E02.E03.720p.HDTV.x264-GRP").unwrap();
        assert_eq!(result.episodes, vec![2, 3]);
    }

    #[test]
    fn test_parse_nxnn() {
        let result = parse_release("Show Name - 1x02 - Title [HDTV]").unwrap();
        assert_eq!(result.show_name, "Show Name");
        assert_eq!(result.season, Some(1));
        assert_eq!(result.episodes, vec![2]);
    }

    #[test]
    fn test_parse_season_packs() {
        let result = parse_release("Show.Name.S02.1080p.BluRay.x264-GRP").unwrap();
        assert!(result.is_season_pack());
        assert_eq!(result.season, Some(2));
        assert_eq!(result.show_name, "Show Name");

        let result = parse_release("Show Name Season 3 Complete 720p").unwrap();
        assert!(result.is_season_pack());
        assert_eq!(result.season, Some(3));
    }

    #[test]
    fn test_parse_air_by_date() {
        let result =
            parse_release("The.Daily.Show.2026.01.07.Stephen.J.Dubner.720p.WEB.h264-EDITH").unwrap();
        assert_eq!(result.show_name, "The Daily Show");
        assert_eq!(result.air_date, NaiveDate::from_ymd_opt(2026, 1, 7));
        assert!(result.episodes.is_empty());
        assert!(!result.is_season_pack());
    }

    #[test]
    fn test_parse_bracket_group_and_version() {
        let result = parse_release("[SubGroup] Show Name - S01E05v2 [720p]").unwrap();
        assert_eq!(result.show_name, "Show Name");
        assert_eq!(result.release_group.as_deref(), Some("SubGroup"));
        assert_eq!(result.episodes, vec![5]);
        assert_eq!(result.version, 2);
    }

    #[test]
    fn test_proper_tags() {
        let result = parse_release("Show.Name.S01E02.REAL.PROPER.720p.HDTV.x264-GRP").unwrap();
        assert_eq!(result.proper_tags, vec!["real".to_string(), "proper".to_string()]);

        let result = parse_release("Show.Name.S01E02.REPACK.720p.HDTV.x264-GRP").unwrap();
        assert!(result.is_proper());

        // Part of a word is not a tag
        let result = parse_release("Improper.Show.S01E02.720p.HDTV.x264-GRP").unwrap();
        assert!(!result.is_proper());
    }

    #[test]
    fn test_unparseable() {
        assert!(parse_release("Some.Movie.1080p.BluRay.x264-GRP").is_none());
    }

    #[test]
    fn test_normalize_show_name() {
        assert_eq!(normalize_show_name("The Office (US)"), "office us");
        assert_eq!(normalize_show_name("Law & Order: SVU"), "law and order svu");
        assert_eq!(normalize_show_name("Marvel's.Agents_of-S.H.I.E.L.D"), "marvels agents of s h i e l d");
    }

    #[test]
    fn test_show_name_matches() {
        let aliases = vec!["Shield".to_string()];
        assert!(show_name_matches("Agents of SHIELD", &aliases, "shield"));
        assert!(show_name_matches("Doctor Who (2005)", &[], "Doctor Who"));
        assert!(show_name_matches("Doctor Who (2005)", &[], "Doctor Who 2005"));
        assert!(!show_name_matches("Chicago Fire", &[], "Chicago PD"));
        assert!(!show_name_matches("Chicago Fire", &[], ""));
        assert!(show_name_matches("The Office (US)", &[], "The.Office.US"));
    }
}
