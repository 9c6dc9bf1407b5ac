//! Finding and snatching PROPER/REPACK releases of recent episodes

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::picker::pick_best_result;
use super::snatch::snatch_episode;
use super::{PROPER_NAME, SearchContext, SearchResult};
use crate::common::{EpisodeKey, EpisodeStatus, Quality};
use crate::db::sqlite_helpers::str_to_datetime;
use crate::db::{EpisodeRecord, TvShowRecord};
use crate::indexer::{ProviderError, ProviderQuery, ReleaseInfo, SearchProvider};
use crate::services::filename_parser::{parse_release, show_name_matches};

/// Episodes aired this many days ago or later are checked for propers
const PROPER_SEARCH_DAYS: i64 = 2;

/// A proper is only taken when the original was snatched this recently
const PROPER_HISTORY_DAYS: i64 = 30;

const PROPER_TERMS: [&str; 2] = ["PROPER", "REPACK"];

/// Release name with separators folded to spaces, lowercased
pub fn generic_name(name: &str) -> String {
    name.replace(['.', '-', '_'], " ").to_lowercase()
}

struct Candidate {
    release: ReleaseInfo,
    provider: usize,
    show_id: i64,
}

/// Recently aired episodes that were snatched or downloaded, per show
async fn recent_episodes(ctx: &SearchContext) -> Result<BTreeMap<i64, Vec<EpisodeRecord>>> {
    let since = Utc::now().date_naive() - Duration::days(PROPER_SEARCH_DAYS);
    let mut by_show: BTreeMap<i64, Vec<EpisodeRecord>> = BTreeMap::new();

    for episode in ctx.db.episodes().list_aired_since_all(since).await? {
        let status = episode.composite().status;
        if status == EpisodeStatus::Downloaded || status.is_snatched() {
            by_show.entry(episode.show_id).or_default().push(episode);
        }
    }

    Ok(by_show)
}

async fn search_provider(
    provider: &dyn SearchProvider,
    show: &TvShowRecord,
    episodes: &[EpisodeRecord],
) -> Result<Vec<ReleaseInfo>, ProviderError> {
    let mut releases = Vec::new();
    for episode in episodes {
        for term in PROPER_TERMS {
            let mut query = ProviderQuery::episode(&show.name, show.tvdb_id, episode.season, episode.episode);
            query.extra_terms = Some(term.to_string());
            releases.extend(provider.search(&query).await?);
        }
    }
    Ok(releases)
}

/// Search active providers for propers of recently aired episodes that were
/// snatched or downloaded in the same quality. At most one proper is returned
/// per episode.
pub async fn find_propers(ctx: &SearchContext) -> Result<Vec<SearchResult>> {
    info!("Beginning the search for new propers");

    let recent = recent_episodes(ctx).await?;
    if recent.is_empty() {
        debug!("No recently aired episodes to check for propers");
        return Ok(Vec::new());
    }

    let mut shows: HashMap<i64, TvShowRecord> = HashMap::new();
    for show_id in recent.keys() {
        if let Some(show) = ctx.db.tv_shows().get(*show_id).await? {
            shows.insert(show.id, show);
        }
    }

    let providers = ctx.providers.active_providers();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for (idx, provider) in providers.iter().enumerate() {
        debug!(provider = provider.name(), "Searching for any new PROPER releases");
        for (show_id, episodes) in &recent {
            let Some(show) = shows.get(show_id) else {
                continue;
            };

            let releases = match search_provider(provider.as_ref(), show, episodes).await {
                Ok(releases) => releases,
                Err(ProviderError::Auth(msg)) => {
                    warn!(provider = provider.name(), error = %msg, "Authentication error");
                    break;
                }
                Err(e) => {
                    debug!(provider = provider.name(), error = %e, "Error while searching provider, skipping");
                    break;
                }
            };

            for release in releases {
                if !PROPER_NAME.is_match(&release.title) {
                    continue;
                }
                if seen_names.insert(generic_name(&release.title)) {
                    candidates.push(Candidate {
                        release,
                        provider: idx,
                        show_id: *show_id,
                    });
                }
            }
        }
    }

    candidates.sort_by(|a, b| b.release.publish_date.cmp(&a.release.publish_date));

    let filters = ctx.result_filters().await?;
    let mut chosen: BTreeMap<(i64, EpisodeKey), SearchResult> = BTreeMap::new();

    for candidate in candidates {
        let Some(show) = shows.get(&candidate.show_id) else {
            continue;
        };
        let title = &candidate.release.title;

        let Some(parsed) = parse_release(title) else {
            debug!(title = %title, "Unable to parse proper, skipping");
            continue;
        };
        if parsed.episodes.is_empty() {
            debug!(title = %title, "Proper has no episode numbers, skipping");
            continue;
        }
        if !show_name_matches(&show.name, &show.aliases, &parsed.show_name) {
            continue;
        }

        let season = parsed.season.unwrap_or(1);
        let keys: Vec<EpisodeKey> = parsed.episodes.iter().map(|e| EpisodeKey::new(season, *e)).collect();
        let quality = Quality::from_name(title, show.is_anime);

        let Some(result) = SearchResult::from_release(
            providers[candidate.provider].as_ref(),
            &candidate.release,
            &parsed,
            show.id,
            quality,
            keys.clone(),
        ) else {
            continue;
        };

        let Some(result) = pick_best_result(std::slice::from_ref(&result), show, &filters) else {
            debug!(title = %title, "Proper rejected by the release filters");
            continue;
        };

        if show.is_anime && result.release_group.is_none() && result.version < 0 {
            debug!(title = %title, "Anime proper has no release group or version, skipping");
            continue;
        }

        let key = keys[0];
        let Some(episode) = ctx.db.episodes().get(show.id, key).await? else {
            continue;
        };
        let old = episode.composite();
        if !matches!(old.status, EpisodeStatus::Downloaded | EpisodeStatus::Snatched)
            || old.quality != result.quality
        {
            debug!(title = %title, "Proper does not replace what we have, skipping");
            continue;
        }

        if chosen.contains_key(&(show.id, key)) {
            continue;
        }
        info!(title = %title, episode = %key, "Found a proper that we need");
        chosen.insert((show.id, key), result);
    }

    Ok(chosen.into_values().collect())
}

fn within(date: &str, cutoff: DateTime<Utc>) -> bool {
    str_to_datetime(date).is_ok_and(|d| d >= cutoff)
}

/// Snatch propers whose original release is in recent history. Returns the
/// number of propers sent to a client.
pub async fn snatch_propers(ctx: &SearchContext, propers: Vec<SearchResult>) -> Result<usize> {
    let cutoff = Utc::now() - Duration::days(PROPER_HISTORY_DAYS);
    let mut snatched = 0;

    for proper in propers {
        let Some(key) = proper.episodes.first().copied() else {
            continue;
        };

        let history = ctx.db.history().list_for_episode(proper.show_id, key).await?;

        let has_original = history.iter().any(|h| {
            let action = h.action();
            (action.status.is_snatched() || action.status == EpisodeStatus::Downloaded)
                && h.quality == proper.quality.bits() as i64
                && within(&h.date, cutoff)
        });
        if !has_original {
            debug!(name = %proper.name, "Unable to find an original history entry for proper, skipping");
            continue;
        }

        let wanted_name = generic_name(&proper.name);
        if history.iter().any(|h| generic_name(&h.resource) == wanted_name) {
            debug!(name = %proper.name, "This proper is already in history, skipping");
            continue;
        }

        let Some(show) = ctx.db.tv_shows().get(proper.show_id).await? else {
            continue;
        };

        if snatch_episode(ctx, &show, &proper).await? {
            snatched += 1;
        }
    }

    Ok(snatched)
}
