//! Backlog searcher
//!
//! Walks every active show and queues a backlog search per season of wanted
//! episodes. A full run looks at every episode; in between only the last
//! `backlog_days` are checked.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::db::{Database, EpisodeRecord};
use crate::queue::{SearchKind, SearchQueue};
use crate::search::needed::backlog_segments;

pub struct BacklogSearcher {
    backlog_days: i64,
    cycle_days: i64,
    last_full_run: Mutex<Option<NaiveDate>>,
    active: AtomicBool,
}

impl BacklogSearcher {
    pub fn new(backlog_days: i64, cycle_days: i64) -> Self {
        Self {
            backlog_days,
            cycle_days,
            last_full_run: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn last_full_run(&self) -> Option<NaiveDate> {
        *self.last_full_run.lock()
    }

    /// Earliest air date to consider, and whether this is a full run
    fn from_date(&self, today: NaiveDate, force: bool) -> (NaiveDate, bool) {
        let due = self
            .last_full_run()
            .is_none_or(|last| last <= today - Duration::days(self.cycle_days));

        if force || due {
            (NaiveDate::MIN, true)
        } else {
            (today - Duration::days(self.backlog_days), false)
        }
    }

    /// Queue backlog searches for every active show. Returns the number of
    /// segments queued.
    pub async fn search_backlog(&self, db: &Database, search_queue: &SearchQueue, force: bool) -> Result<usize> {
        if self.active.swap(true, Ordering::SeqCst) {
            debug!("Backlog search is already running, not starting again");
            return Ok(0);
        }

        let outcome = self.queue_segments(db, search_queue, force).await;
        self.active.store(false, Ordering::SeqCst);
        outcome
    }

    async fn queue_segments(&self, db: &Database, search_queue: &SearchQueue, force: bool) -> Result<usize> {
        let today = Utc::now().date_naive();
        let (from_date, full) = self.from_date(today, force);
        if full {
            info!("Running full backlog search on missed episodes for all shows");
        } else {
            info!(days = self.backlog_days, "Running limited backlog search on missed episodes");
        }

        let mut queued = 0;
        for show in db.tv_shows().list_active().await? {
            let segments = backlog_segments(db, &show, from_date).await?;

            for (season, segment) in segments {
                let keys: Vec<_> = segment.iter().map(EpisodeRecord::key).collect();
                if search_queue.is_in_queue(show.id, &keys) {
                    debug!(show = %show.name, season, "Backlog segment is already queued");
                    continue;
                }

                if search_queue
                    .add_item(SearchKind::Backlog {
                        show: show.clone(),
                        segment,
                    })
                    .is_ok()
                {
                    queued += 1;
                }
            }
        }

        if full {
            *self.last_full_run.lock() = Some(today);
        }

        info!(segments = queued, "Completed backlog search");
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_run_cycle() {
        let searcher = BacklogSearcher::new(7, 7);
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();

        assert_eq!(searcher.from_date(today, false), (NaiveDate::MIN, true));

        *searcher.last_full_run.lock() = Some(today - Duration::days(2));
        assert_eq!(
            searcher.from_date(today, false),
            (NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(), false)
        );
        assert_eq!(searcher.from_date(today, true), (NaiveDate::MIN, true));

        *searcher.last_full_run.lock() = Some(today - Duration::days(7));
        assert_eq!(searcher.from_date(today, false), (NaiveDate::MIN, true));
    }
}
