//! Nightly show updates

use anyhow::Result;
use tracing::{debug, info};

use crate::db::Database;
use crate::queue::ShowQueue;

/// Queue a metadata update for every show. Returns the number queued.
pub async fn update_all_shows(db: &Database, show_queue: &ShowQueue) -> Result<usize> {
    let mut queued = 0;

    for show in db.tv_shows().list().await? {
        match show_queue.update_show(&show, false) {
            Ok(_) => queued += 1,
            Err(e) => debug!(show = %show.name, error = %e, "Not updating show"),
        }
    }

    info!(count = queued, "Queued show updates");
    Ok(queued)
}
