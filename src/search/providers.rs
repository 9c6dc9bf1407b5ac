//! Backlog, manual and failed searches across providers

use std::cmp::Reverse;
use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use super::nzb_splitter;
use super::picker::{ResultFilters, is_final_result, pick_best_result};
use super::{EpisodeIndex, ResultKey, ResultMap, SearchContext, SearchResult};
use crate::common::{CompositeStatus, EpisodeKey, EpisodeStatus, Quality};
use crate::db::{EpisodeRecord, TvShowRecord};
use crate::indexer::{ProviderError, ProviderQuery, ProviderType, ReleaseInfo, SearchMode, SearchProvider};
use crate::services::filename_parser::{parse_release, show_name_matches};

/// Whether a release of `quality` should be downloaded for an episode whose
/// current status is `status` (`None` when the episode is unknown).
///
/// Manual searches may grab skipped/ignored/archived episodes and may replace
/// the current quality; with `down_cur_quality` an equal quality is accepted
/// too.
pub fn want_episode(
    show: &TvShowRecord,
    status: Option<CompositeStatus>,
    quality: Quality,
    manual: bool,
    down_cur_quality: bool,
) -> bool {
    let profile = &show.quality;

    if !profile.contains(quality) {
        debug!(show = %show.name, quality = %quality, "Don't want this quality, ignoring found episode");
        return false;
    }

    let Some(current) = status else {
        debug!(show = %show.name, "Unable to find a matching episode in database, ignoring found episode");
        return false;
    };

    use EpisodeStatus::*;
    if matches!(current.status, Archived | Unaired | Skipped | Ignored) && !manual {
        debug!(status = %current.status, "Existing episode status is unaired/skipped/ignored/archived, ignoring found episode");
        return false;
    }

    if matches!(current.status, Wanted | Skipped | Unknown) {
        debug!(status = %current.status, "Existing episode status is wanted/skipped/unknown, getting found episode");
        return true;
    }

    if manual
        && ((down_cur_quality && quality >= current.quality)
            || (!down_cur_quality && quality > current.quality))
    {
        debug!("Usually ignoring found episode, but forced search allows the quality, getting found episode");
        return true;
    }

    if matches!(current.status, Downloaded | Snatched | SnatchedProper)
        && profile.is_preferred(quality)
        && (quality > current.quality || !profile.is_preferred(current.quality))
    {
        debug!("Episode already exists but the found episode quality is wanted more, getting found episode");
        return true;
    }

    debug!(status = %current.status, quality = %quality, "Episode already exists and the found episode has same/lower quality, ignoring found episode");
    false
}

/// Queries to send to a provider for these episodes in this mode
fn build_queries(show: &TvShowRecord, episodes: &[EpisodeRecord], mode: SearchMode) -> Vec<ProviderQuery> {
    let mut queries = Vec::new();

    match mode {
        SearchMode::SeasonOnly if episodes.len() > 1 => {
            let seasons: BTreeSet<i32> = episodes.iter().map(|e| e.season).collect();
            for season in seasons {
                queries.push(ProviderQuery::season(&show.name, show.tvdb_id, season));
            }
        }
        SearchMode::EpisodeOnly => {
            for ep in episodes {
                queries.push(ProviderQuery::episode(&show.name, show.tvdb_id, ep.season, ep.episode));
            }
        }
        // A single episode is never searched as a season pack
        SearchMode::SeasonOnly => {}
    }

    queries
}

/// Where a parsed release belongs, or `None` when it is not what we searched for
fn classify(
    item: &ReleaseInfo,
    show: &TvShowRecord,
    episodes: &[EpisodeRecord],
    index: &EpisodeIndex,
    mode: SearchMode,
) -> Option<(i32, Vec<i32>, crate::services::ParsedRelease)> {
    let title = item.title.as_str();

    let Some(parsed) = parse_release(title) else {
        debug!(title, "Unable to parse the release name into a valid episode");
        return None;
    };

    if !show_name_matches(&show.name, &show.aliases, &parsed.show_name) {
        debug!(title, show = %show.name, "Release is for another show");
        return None;
    }

    if let Some(date) = parsed.air_date {
        let matches = index.by_airdate(date);
        if matches.len() != 1 {
            warn!(title, %date, "Tried to look up the date for the episode but the database didn't give proper results, skipping it");
            return None;
        }
        let ep = matches[0];
        return Some((ep.season, vec![ep.episode], parsed));
    }

    let season = parsed.season?;
    let searched = |s: i32, e: i32| episodes.iter().any(|ep| ep.season == s && ep.episode == e);

    match mode {
        SearchMode::SeasonOnly => {
            if !parsed.episodes.is_empty() {
                debug!(title, "This is supposed to be a season pack search but the result is not a valid season pack, skipping it");
                return None;
            }
            if !episodes.iter().any(|ep| ep.season == season) {
                debug!(title, season, "Season pack is for a season we are not searching, ignoring");
                return None;
            }
        }
        SearchMode::EpisodeOnly => {
            if parsed.episodes.is_empty() {
                debug!(title, "The result doesn't seem to be a valid season that we are trying to snatch, ignoring");
                return None;
            }
            if !parsed.episodes.iter().any(|&e| searched(season, e)) {
                debug!(title, "The result doesn't seem to be a valid episode that we are trying to snatch, ignoring");
                return None;
            }
        }
    }

    let numbers = parsed.episodes.clone();
    Some((season, numbers, parsed))
}

/// Search one provider and bucket what it returns.
///
/// Items are considered best quality first with unknown qualities last, and
/// only releases for wanted episodes are kept.
pub async fn find_search_results(
    provider: &dyn SearchProvider,
    show: &TvShowRecord,
    episodes: &[EpisodeRecord],
    index: &EpisodeIndex,
    mode: SearchMode,
    manual: bool,
    down_cur_quality: bool,
) -> Result<ResultMap, ProviderError> {
    let mut items = Vec::new();
    for query in build_queries(show, episodes, mode) {
        items.extend(provider.search(&query).await?);
    }

    let mut rated: Vec<(Quality, ReleaseInfo)> = items
        .into_iter()
        .map(|item| (Quality::from_name(&item.title, show.is_anime), item))
        .collect();
    rated.sort_by_key(|(q, _)| (q.is_unknown(), Reverse(*q)));

    let mut results = ResultMap::new();

    for (quality, item) in rated {
        let Some((season, numbers, parsed)) = classify(&item, show, episodes, index, mode) else {
            continue;
        };

        let keys: Vec<EpisodeKey> = numbers.iter().map(|&e| EpisodeKey::new(season, e)).collect();
        let wanted = keys
            .iter()
            .all(|k| want_episode(show, index.status(k), quality, manual, down_cur_quality));
        if !wanted {
            info!(title = %item.title, quality = %quality, "Ignoring result because we don't want an episode at this quality");
            continue;
        }

        let Some(result) = SearchResult::from_release(provider, &item, &parsed, show.id, quality, keys)
        else {
            debug!(title = %item.title, "Release has no download link, skipping");
            continue;
        };
        debug!(title = %item.title, url = %result.url, "Found result");

        // Season packs only list their season until they are expanded
        if result.episodes.is_empty() {
            debug!(title = %item.title, season, "Separating full season result to check for later");
        } else if result.episodes.len() > 1 {
            debug!(title = %item.title, episodes = ?numbers, "Separating multi-episode result to check for later");
        }

        results.entry(result.result_key()).or_default().push(result);
    }

    Ok(results)
}

/// Search every backlog provider for `episodes` of `show` and return the
/// results to snatch.
///
/// Providers are asked in order until every requested episode has a result
/// that [`is_final_result`] accepts.
pub async fn search_providers(
    ctx: &SearchContext,
    show: &TvShowRecord,
    episodes: &[EpisodeRecord],
    manual: bool,
    down_cur_quality: bool,
) -> Result<Vec<SearchResult>> {
    let index = EpisodeIndex::load(&ctx.db, show.id).await?;
    let filters = ctx.result_filters().await?;
    let providers = ctx.providers.backlog_providers();

    let mut final_results: Vec<SearchResult> = Vec::new();
    let mut did_search = false;

    for provider in providers {
        let settings = provider.settings();
        if settings.anime_only && !show.is_anime {
            debug!(show = %show.name, provider = provider.name(), "Show is not an anime, skipping");
            continue;
        }

        let mut found = ResultMap::new();
        let mut mode = settings.search_mode;
        if mode == SearchMode::SeasonOnly && manual {
            mode = SearchMode::EpisodeOnly;
        }

        let mut search_count = 0;
        loop {
            search_count += 1;
            match mode {
                SearchMode::EpisodeOnly => info!(show = %show.name, provider = provider.name(), "Performing episode search"),
                SearchMode::SeasonOnly => info!(show = %show.name, provider = provider.name(), "Performing season pack search"),
            }

            match find_search_results(provider.as_ref(), show, episodes, &index, mode, manual, down_cur_quality).await {
                Ok(results) => {
                    did_search = true;
                    if !results.is_empty() {
                        for (key, mut list) in results {
                            found.entry(key).or_default().append(&mut list);
                        }
                        break;
                    }
                }
                Err(ProviderError::Auth(msg)) => {
                    error!(provider = provider.name(), error = %msg, "Authentication error");
                    break;
                }
                Err(e) => {
                    error!(provider = provider.name(), error = %e, "Error while searching provider, skipping");
                    break;
                }
            }

            if !settings.search_fallback || search_count == 2 {
                break;
            }

            mode = mode.other();
            debug!(provider = provider.name(), mode = %mode, "Fallback search initiated");
        }

        if found.is_empty() {
            continue;
        }

        let best_season = found
            .get(&ResultKey::Season)
            .and_then(|list| pick_best_result(list, show, &filters));

        let highest_quality_overall = found
            .values()
            .flatten()
            .map(|r| r.quality)
            .filter(|q| !q.is_unknown())
            .max()
            .unwrap_or(Quality::NONE);
        debug!(quality = %highest_quality_overall, "The highest quality of any match");

        if let Some(mut season_result) = best_season {
            let searched_seasons: BTreeSet<i32> = episodes.iter().map(|e| e.season).collect();
            let season_episodes = index.in_seasons(&searched_seasons);

            let mut all_wanted = !season_episodes.is_empty();
            let mut any_wanted = false;
            for key in &season_episodes {
                if want_episode(show, index.status(key), season_result.quality, false, down_cur_quality) {
                    any_wanted = true;
                } else {
                    all_wanted = false;
                }
            }

            if all_wanted && season_result.quality == highest_quality_overall {
                info!(
                    release = %season_result.name,
                    provider_type = %season_result.provider_type,
                    "Every episode in this season is needed, downloading the whole season"
                );
                season_result.episodes = season_episodes;
                return Ok(vec![season_result]);
            } else if !any_wanted {
                debug!(release = %season_result.name, "No episodes from this season are wanted at this quality, ignoring the result");
            } else if season_result.provider_type == ProviderType::Nzb {
                debug!(release = %season_result.name, "Breaking apart the NZB and adding the individual ones to our results");
                for split in nzb_splitter::split_result(provider.as_ref(), &season_result, show, &index).await {
                    found.entry(split.result_key()).or_default().push(split);
                }
            } else {
                info!(
                    release = %season_result.name,
                    "Adding multi-episode result for full-season torrent, unwanted episodes can be skipped in the torrent client"
                );
                season_result.episodes = season_episodes;
                found.entry(ResultKey::MultiEp).or_default().push(season_result);
            }
        }

        let multis = resolve_multi_results(&mut found, show, &filters);
        final_results.extend(multis);

        for (key, list) in &found {
            if !matches!(key, ResultKey::Episode(_)) || list.is_empty() {
                continue;
            }

            let Some(best) = pick_best_result(list, show, &filters) else {
                continue;
            };

            let mut covered = false;
            final_results.retain(|existing| {
                let overlaps = best.episodes.iter().any(|k| existing.covers(k));
                if overlaps && existing.quality < best.quality {
                    return false;
                }
                if overlaps {
                    covered = true;
                }
                true
            });

            if !covered {
                final_results.push(best);
            }
        }

        let satisfied = episodes
            .iter()
            .filter(|ep| {
                final_results
                    .iter()
                    .any(|r| r.covers(&ep.key()) && is_final_result(r, show))
            })
            .count();

        if satisfied == episodes.len() {
            break;
        }
    }

    if !did_search {
        warn!("No NZB/Torrent providers found or enabled for backlog searches, please check your settings");
    }

    Ok(final_results)
}

/// Keep the multi-episode results that cover something no single-episode
/// result or earlier multi-episode result covers. Single results for the
/// episodes of a kept multi are dropped from `found`.
fn resolve_multi_results(
    found: &mut ResultMap,
    show: &TvShowRecord,
    filters: &ResultFilters,
) -> Vec<SearchResult> {
    let Some(candidates) = found.get(&ResultKey::MultiEp).cloned() else {
        return Vec::new();
    };

    let mut claimed: Vec<(EpisodeKey, usize)> = Vec::new();
    let mut kept: Vec<SearchResult> = Vec::new();

    for candidate in candidates {
        debug!(release = %candidate.name, "Seeing if we want to bother with multi-episode result");

        let Some(multi) = pick_best_result(std::slice::from_ref(&candidate), show, filters) else {
            continue;
        };

        let needed = multi.episodes.iter().filter(|k| {
            found
                .get(&ResultKey::Episode(**k))
                .is_none_or(|list| list.is_empty())
        });
        if needed.count() == 0 {
            debug!(release = %multi.name, "All of these episodes were covered by single episode results, ignoring this multi-episode result");
            continue;
        }

        let multi_needed = multi
            .episodes
            .iter()
            .filter(|k| !claimed.iter().any(|(c, _)| c == *k))
            .count();
        if multi_needed == 0 {
            debug!(release = %multi.name, "All of these episodes were covered by another multi-episode result, ignoring");
            continue;
        }

        let slot = kept.len();
        for key in &multi.episodes {
            claimed.retain(|(c, _)| c != key);
            claimed.push((*key, slot));
            if found.remove(&ResultKey::Episode(*key)).is_some() {
                debug!(episode = %key, "A needed multi-episode result overlaps with a single-episode result, removing the single-episode results");
            }
        }
        kept.push(multi);
    }

    // A multi whose episodes were all claimed by later multis is dropped
    kept.into_iter()
        .enumerate()
        .filter(|(slot, _)| claimed.iter().any(|(_, s)| s == slot))
        .map(|(_, multi)| multi)
        .collect()
}
