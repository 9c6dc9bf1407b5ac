//! Daily search: flag newly aired episodes and queue a feed search

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::common::{CompositeStatus, EpisodeStatus};
use crate::db::Database;
use crate::queue::{QueueError, SearchKind, SearchQueue};

/// Move episodes that have aired out of `Unaired` and queue a daily search.
/// Returns how many episodes changed status.
pub async fn run_daily_search(db: &Database, search_queue: &SearchQueue) -> Result<usize> {
    let today = Utc::now().date_naive();
    let aired = db.episodes().list_unaired_before(today).await?;

    for episode in &aired {
        let status = EpisodeStatus::once_aired(episode.season);
        debug!(
            show_id = episode.show_id,
            episode = %episode.key(),
            status = %status,
            "Episode has aired"
        );
        db.episodes()
            .update_status(episode.id, CompositeStatus::plain(status))
            .await?;
    }

    if !aired.is_empty() {
        info!(count = aired.len(), "Updated status of newly aired episodes");
    }

    match search_queue.add_item(SearchKind::Daily) {
        Ok(_) => {}
        Err(QueueError::AlreadyQueued(_)) => debug!("Daily search is already queued"),
        Err(e) => return Err(e.into()),
    }

    Ok(aired.len())
}
