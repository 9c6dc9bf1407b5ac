//! Choosing between search results
//!
//! [`pick_best_result`] filters a set of candidate releases against a show's
//! quality profile and release filters and returns the one to snatch.
//! [`is_final_result`] decides whether a pick is good enough to stop asking
//! further providers.

use std::borrow::Cow;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::SearchResult;
use super::release_groups::BlackAndWhiteList;
use crate::db::TvShowRecord;

/// Extras, samples and subbed/dubbed releases are never wanted
static BAD_RELEASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(^|[\W_])(sub(bed|ed|pack|s)|(dir|sample|sub|nfo)fix|sample|(dvd)?extras|dub(bed)?)($|[\W_])",
    )
    .expect("valid bad release regex")
});

/// Words matched as separate tokens of a release name, compiled into one
/// case-insensitive pattern
#[derive(Debug, Clone, Default)]
pub struct WordList {
    words: Vec<String>,
    pattern: Option<Regex>,
}

impl WordList {
    pub fn new<S: AsRef<str>>(words: &[S]) -> Self {
        let words: Vec<String> = words
            .iter()
            .map(|w| w.as_ref().trim())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();

        let pattern = if words.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
            let source = format!(r"(?i)(^|[\W_])(?:{})($|[\W_])", alternatives.join("|"));
            match Regex::new(&source) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(words = ?words, error = %e, "Unable to compile word filter");
                    None
                }
            }
        };

        Self { words, pattern }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Whether `name` contains at least one of the words
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(name))
    }
}

/// Global release filters applied on top of the show's own settings
#[derive(Debug, Clone, Default)]
pub struct ResultFilters {
    pub ignore_words: WordList,
    pub require_words: WordList,
    /// Lowercased names of releases that failed before; `None` disables the check
    pub failed_releases: Option<HashSet<String>>,
}

impl ResultFilters {
    fn has_failed(&self, name: &str) -> bool {
        self.failed_releases
            .as_ref()
            .is_some_and(|failed| failed.contains(&name.to_lowercase()))
    }
}

/// Word lists in effect for one show. A show's own list replaces the global
/// one of the same kind.
struct ShowWords<'a> {
    ignore: Cow<'a, WordList>,
    require: Cow<'a, WordList>,
}

impl<'a> ShowWords<'a> {
    fn new(show: &TvShowRecord, filters: &'a ResultFilters) -> Self {
        let pick = |own: &[String], global: &'a WordList| {
            if own.is_empty() {
                Cow::Borrowed(global)
            } else {
                Cow::Owned(WordList::new(own))
            }
        };
        Self {
            ignore: pick(&show.ignore_words, &filters.ignore_words),
            require: pick(&show.require_words, &filters.require_words),
        }
    }

    fn passes(&self, name: &str) -> bool {
        if self.ignore.matches(name) {
            info!(release = %name, words = ?self.ignore.words(), "Ignoring release based on ignored words filter");
            return false;
        }

        if !self.require.is_empty() && !self.require.matches(name) {
            info!(release = %name, words = ?self.require.words(), "Ignoring release based on required words filter");
            return false;
        }

        if BAD_RELEASE.is_match(name) {
            info!(release = %name, "Ignoring release that is not a valid scene release");
            return false;
        }

        true
    }
}

fn acceptable(result: &SearchResult, show: &TvShowRecord, filters: &ResultFilters, words: &ShowWords<'_>) -> bool {
    if result.show_id != show.id {
        return false;
    }

    if !BlackAndWhiteList::for_show(show).is_valid(result.release_group.as_deref()) {
        debug!(release = %result.name, group = ?result.release_group, "Release group not allowed");
        return false;
    }

    if !show.quality.contains(result.quality) {
        debug!(release = %result.name, quality = %result.quality, "Quality not wanted, rejecting");
        return false;
    }

    if !words.passes(&result.name) {
        return false;
    }

    if filters.has_failed(&result.name) {
        info!(release = %result.name, "Release has previously failed, rejecting");
        return false;
    }

    true
}

/// Whether `candidate` should replace `best` when both have the same quality
fn wins_tie(best: &SearchResult, candidate: &SearchResult) -> bool {
    let best_name = best.name.to_lowercase();
    let name = candidate.name.to_lowercase();

    if name.contains("proper") || name.contains("repack") {
        return true;
    }
    if best_name.contains("internal") && !name.contains("internal") {
        return true;
    }
    if best_name.contains("xvid") && name.contains("x264") {
        debug!(release = %candidate.name, "Preferring x264 over xvid");
        return true;
    }
    false
}

/// Pick the result to snatch out of `results`, or `None` when all are rejected
pub fn pick_best_result(
    results: &[SearchResult],
    show: &TvShowRecord,
    filters: &ResultFilters,
) -> Option<SearchResult> {
    debug!(
        candidates = ?results.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        "Picking the best result"
    );

    let profile = &show.quality;
    let words = ShowWords::new(show, filters);
    let mut best: Option<&SearchResult> = None;

    for candidate in results {
        if !acceptable(candidate, show, filters, &words) {
            continue;
        }

        let replace = match best {
            None => true,
            Some(current) => {
                let q = candidate.quality;
                if profile.is_preferred(q)
                    && (current.quality < q || !profile.is_preferred(current.quality))
                {
                    true
                } else if profile.is_allowed(q)
                    && !profile.is_preferred(current.quality)
                    && current.quality < q
                {
                    true
                } else if current.quality == q {
                    wins_tie(current, candidate)
                } else {
                    false
                }
            }
        };

        if replace {
            best = Some(candidate);
        }
    }

    match best {
        Some(result) => {
            debug!(release = %result.name, "Picked as the best result");
            Some(result.clone())
        }
        None => {
            debug!("No result picked");
            None
        }
    }
}

/// Whether a result is good enough that no further providers need searching
pub fn is_final_result(result: &SearchResult, show: &TvShowRecord) -> bool {
    debug!(release = %result.name, "Checking if we should keep searching");
    let profile = &show.quality;
    let max_preferred = profile.max_preferred();

    if max_preferred.is_some_and(|max| result.quality < max) {
        return false;
    }

    if !BlackAndWhiteList::for_show(show).is_valid(result.release_group.as_deref()) {
        return false;
    }

    if profile.is_allowed(result.quality) {
        return true;
    }

    max_preferred == Some(result.quality)
}

/// Whether a result is a preferred quality, making it the last upgrade
pub fn is_first_best_match(result: &SearchResult, show: &TvShowRecord) -> bool {
    !show.quality.preferred.is_empty() && show.quality.is_preferred(result.quality)
}
