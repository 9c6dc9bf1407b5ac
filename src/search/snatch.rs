//! Handing a chosen result to a download client

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use super::picker::is_first_best_match;
use super::{ResultType, SearchContext, SearchResult};
use crate::common::{CompositeStatus, EpisodeStatus};
use crate::db::{NewHistory, TvShowRecord};

/// Days since airing within which a snatch gets high priority
const HIGH_PRIORITY_DAYS: i64 = 7;

fn is_torrent_file(url: &str) -> bool {
    url.split('?').next().is_some_and(|path| path.ends_with(".torrent"))
}

/// Status an episode moves to when `result` is snatched
pub fn snatch_status(result: &SearchResult, show: &TvShowRecord) -> EpisodeStatus {
    if is_first_best_match(result, show) {
        EpisodeStatus::SnatchedBest
    } else if result.is_proper() {
        EpisodeStatus::SnatchedProper
    } else {
        EpisodeStatus::Snatched
    }
}

/// Send a result to its download client and record the snatch for every
/// episode it contains. Returns `false` when the client did not take it.
pub async fn snatch_episode(
    ctx: &SearchContext,
    show: &TvShowRecord,
    result: &SearchResult,
) -> Result<bool> {
    let mut result = result.clone();
    let mut episodes = Vec::with_capacity(result.episodes.len());
    for key in &result.episodes {
        match ctx.db.episodes().get(show.id, *key).await? {
            Some(episode) => episodes.push(episode),
            None => warn!(show = %show.name, episode = %key, "Snatched episode is not in the database"),
        }
    }

    if ctx.settings.allow_high_priority {
        let recent = Utc::now().date_naive() - Duration::days(HIGH_PRIORITY_DAYS);
        if episodes
            .iter()
            .any(|e| e.airdate.is_some_and(|date| date >= recent))
        {
            result.priority = 1;
        }
    }

    let end_status = snatch_status(&result, show);

    if result.is_magnet() || is_torrent_file(&result.url) {
        result.result_type = ResultType::Torrent;
    }

    let client = ctx.clients.for_result(&result);
    let needs_content = result.content.is_none()
        && result.result_type != ResultType::NzbData
        && (client.needs_content(&result)
            || (result.result_type == ResultType::Torrent && !result.is_magnet()));

    if needs_content {
        match ctx.providers.get(&result.provider) {
            Some(provider) => match provider.download(&result.url).await {
                Ok(content) => result.content = Some(content),
                Err(e) => {
                    warn!(provider = %result.provider, url = %result.url, error = %e, "Failed to download result");
                    return Ok(false);
                }
            },
            None => {
                warn!(provider = %result.provider, "Result came from an unknown provider");
                return Ok(false);
            }
        }
    }

    info!(
        name = %result.name,
        provider = %result.provider,
        client = client.name(),
        priority = result.priority,
        "Downloading result"
    );

    let sent = match client.send(&result).await {
        Ok(sent) => sent,
        Err(e) => {
            warn!(name = %result.name, client = client.name(), error = %e, "Download client error");
            false
        }
    };
    if !sent {
        return Ok(false);
    }

    if ctx.settings.use_failed_downloads {
        for episode in &episodes {
            ctx.db
                .failed()
                .log_snatch(episode, &result.name, result.size, &result.provider)
                .await?;
        }
    }

    ctx.notifications.message("Episode snatched", &result.name);

    let status = CompositeStatus::new(end_status, result.quality);
    for episode in &episodes {
        ctx.db
            .history()
            .log(NewHistory {
                action: status,
                show_id: show.id,
                key: episode.key(),
                quality: result.quality,
                resource: &result.name,
                provider: &result.provider,
                version: result.version,
            })
            .await?;

        ctx.db
            .episodes()
            .mark_snatched(episode.id, status, &result.name)
            .await?;

        ctx.notifications
            .notify_snatch(&episode.pretty_name(&show.name))
            .await;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Quality, QualityProfile};
    use crate::indexer::ProviderType;

    #[test]
    fn test_torrent_file_detection_ignores_query() {
        assert!(is_torrent_file("http://tracker/file.torrent"));
        assert!(is_torrent_file("http://tracker/file.torrent?passkey=abc"));
        assert!(!is_torrent_file("http://indexer/getnzb/123"));
    }

    #[test]
    fn test_snatch_status() {
        let show = TvShowRecord {
            id: 1,
            indexer_id: 1,
            tvdb_id: None,
            name: "Show".into(),
            aliases: vec![],
            quality: QualityProfile::new(vec![Quality::HDTV], vec![Quality::HDBLURAY]),
            paused: false,
            is_anime: false,
            default_ep_status: EpisodeStatus::Wanted,
            ignore_words: vec![],
            require_words: vec![],
            whitelist: vec![],
            blacklist: vec![],
        };

        let mut result = SearchResult::new("p", ProviderType::Nzb, "Show.S01E01.720p.HDTV-GRP", "u", 1);
        result.quality = Quality::HDTV;
        assert_eq!(snatch_status(&result, &show), EpisodeStatus::Snatched);

        result.name = "Show.S01E01.PROPER.720p.HDTV-GRP".into();
        assert_eq!(snatch_status(&result, &show), EpisodeStatus::SnatchedProper);

        result.quality = Quality::HDBLURAY;
        assert_eq!(snatch_status(&result, &show), EpisodeStatus::SnatchedBest);
    }
}
