//! Daily search: match provider feeds against wanted episodes

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use super::picker::pick_best_result;
use super::providers::want_episode;
use super::{EpisodeIndex, SearchContext, SearchResult};
use crate::common::{EpisodeKey, EpisodeStatus, Quality};
use crate::db::{Database, EpisodeRecord, TvShowRecord};
use crate::indexer::{ProviderError, ReleaseInfo, SearchProvider};
use crate::services::filename_parser::{parse_release, show_name_matches};

/// An episode the daily search should look for
#[derive(Debug, Clone, PartialEq)]
pub struct WantedEpisode {
    pub episode: EpisodeRecord,
    /// Qualities that would improve on what the episode has now
    pub wanted_qualities: Vec<Quality>,
}

/// Episodes of `show` aired after `from_date` that are wanted or could still
/// be upgraded to a better quality
pub async fn wanted_episodes(
    db: &Database,
    show: &TvShowRecord,
    from_date: NaiveDate,
) -> Result<Vec<WantedEpisode>> {
    debug!(show = %show.name, "Seeing if we need anything");

    let all_qualities = show.quality.all();
    let highest = if show.quality.preferred.is_empty() {
        Quality::NONE
    } else {
        all_qualities.iter().copied().max().unwrap_or(Quality::NONE)
    };

    let episodes = db.episodes().list_aired_after(show.id, from_date).await?;
    let wanted = episodes
        .into_iter()
        .filter_map(|episode| {
            let current = episode.composite();
            let upgradable = matches!(
                current.status,
                EpisodeStatus::Downloaded | EpisodeStatus::Snatched | EpisodeStatus::SnatchedProper
            ) && current.quality < highest;

            if !(upgradable || current.status == EpisodeStatus::Wanted) {
                return None;
            }

            let wanted_qualities = all_qualities
                .iter()
                .copied()
                .filter(|q| *q > current.quality && !q.is_unknown())
                .collect();
            Some(WantedEpisode {
                episode,
                wanted_qualities,
            })
        })
        .collect();

    Ok(wanted)
}

/// Episodes the backlog should search for, grouped by season.
///
/// An episode qualifies when it is `Wanted`, or when it was snatched or
/// downloaded in a quality the profile would still upgrade: anything not
/// preferred when the profile has preferred qualities, anything not allowed
/// otherwise.
pub async fn backlog_segments(
    db: &Database,
    show: &TvShowRecord,
    from_date: NaiveDate,
) -> Result<BTreeMap<i32, Vec<EpisodeRecord>>> {
    let mut segments: BTreeMap<i32, Vec<EpisodeRecord>> = BTreeMap::new();

    for episode in db.episodes().list_aired_after(show.id, from_date).await? {
        let current = episode.composite();
        let wanted = match current.status {
            EpisodeStatus::Wanted => true,
            EpisodeStatus::Downloaded | EpisodeStatus::Snatched | EpisodeStatus::SnatchedProper => {
                if show.quality.preferred.is_empty() {
                    !show.quality.is_allowed(current.quality)
                } else {
                    !show.quality.is_preferred(current.quality)
                }
            }
            _ => false,
        };

        if wanted {
            segments.entry(episode.season).or_default().push(episode);
        }
    }

    Ok(segments)
}

/// Wanted episodes of one show, with the show's episode index
struct ShowWants {
    show: TvShowRecord,
    index: EpisodeIndex,
    wanted: HashMap<EpisodeKey, WantedEpisode>,
}

/// Single-episode feed items that match a wanted episode at a wanted quality
fn match_feed(
    provider: &dyn SearchProvider,
    items: &[ReleaseInfo],
    wants: &[ShowWants],
) -> BTreeMap<(i64, EpisodeKey), Vec<SearchResult>> {
    let mut matched: BTreeMap<(i64, EpisodeKey), Vec<SearchResult>> = BTreeMap::new();

    for item in items {
        let Some(parsed) = parse_release(&item.title) else {
            continue;
        };

        let Some(entry) = wants
            .iter()
            .find(|w| show_name_matches(&w.show.name, &w.show.aliases, &parsed.show_name))
        else {
            continue;
        };

        let key = match (parsed.air_date, parsed.season, parsed.episodes.as_slice()) {
            (Some(date), _, _) => match entry.index.by_airdate(date).as_slice() {
                [ep] => ep.key(),
                _ => continue,
            },
            (None, Some(season), [episode]) => EpisodeKey::new(season, *episode),
            _ => {
                debug!(title = %item.title, "Only single episode releases are used from feeds");
                continue;
            }
        };

        let Some(wanted) = entry.wanted.get(&key) else {
            continue;
        };

        let quality = Quality::from_name(&item.title, entry.show.is_anime);
        if !wanted.wanted_qualities.contains(&quality)
            || !want_episode(&entry.show, entry.index.status(&key), quality, false, false)
        {
            debug!(title = %item.title, quality = %quality, "Feed item is not a wanted quality");
            continue;
        }

        if let Some(result) =
            SearchResult::from_release(provider, item, &parsed, entry.show.id, quality, vec![key])
        {
            matched.entry((entry.show.id, key)).or_default().push(result);
        }
    }

    matched
}

/// Check every daily provider's feed for wanted episodes and keep the best
/// result per episode across providers
pub async fn search_for_needed_episodes(ctx: &SearchContext) -> Result<Vec<SearchResult>> {
    let from_date = NaiveDate::MIN;
    let mut wants = Vec::new();

    for show in ctx.db.tv_shows().list_active().await? {
        let wanted = wanted_episodes(&ctx.db, &show, from_date).await?;
        if wanted.is_empty() {
            continue;
        }
        let index = EpisodeIndex::load(&ctx.db, show.id).await?;
        wants.push(ShowWants {
            wanted: wanted.into_iter().map(|w| (w.episode.key(), w)).collect(),
            show,
            index,
        });
    }

    let filters = ctx.result_filters().await?;
    let mut found: BTreeMap<(i64, EpisodeKey), SearchResult> = BTreeMap::new();
    let mut did_search = false;

    for provider in ctx.providers.daily_providers() {
        let items = match provider.recent().await {
            Ok(items) => items,
            Err(ProviderError::Auth(msg)) => {
                error!(provider = provider.name(), error = %msg, "Authentication error");
                continue;
            }
            Err(e) => {
                error!(provider = provider.name(), error = %e, "Error while searching provider, skipping");
                continue;
            }
        };
        did_search = true;

        for ((show_id, key), results) in match_feed(provider.as_ref(), &items, &wants) {
            let Some(entry) = wants.iter().find(|w| w.show.id == show_id) else {
                continue;
            };

            let Some(best) = pick_best_result(&results, &entry.show, &filters) else {
                debug!(show = %entry.show.name, episode = %key, "All found results were rejected");
                continue;
            };

            if found
                .get(&(show_id, key))
                .is_some_and(|existing| best.quality <= existing.quality)
            {
                continue;
            }
            found.insert((show_id, key), best);
        }
    }

    if !did_search {
        warn!("No NZB/Torrent providers found or enabled for daily searches, please check your settings");
    }

    info!(count = found.len(), "Daily search finished");
    Ok(found.into_values().collect())
}
