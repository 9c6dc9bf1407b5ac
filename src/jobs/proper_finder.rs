//! Scheduled proper search

use tracing::debug;

use crate::queue::{QueueError, SearchKind, SearchQueue};

/// Queue a search for propers of recently aired episodes
pub fn queue_proper_search(search_queue: &SearchQueue) -> Result<(), QueueError> {
    match search_queue.add_item(SearchKind::Proper) {
        Ok(_) => Ok(()),
        Err(QueueError::AlreadyQueued(_)) => {
            debug!("Proper search is already queued");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
