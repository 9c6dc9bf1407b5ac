//! Search queue
//!
//! Daily, backlog, manual, failed and proper searches share one queue so a
//! show is never searched twice at the same time. Manual and failed searches
//! are remembered after they finish so the UI can show their outcome.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::generic::{GenericQueue, ItemSnapshot, QueuedItem};
use super::{QueueError, QueueItem, QueuePriority};
use crate::common::EpisodeKey;
use crate::db::{EpisodeRecord, TvShowRecord};
use crate::search::{
    SearchContext, find_propers, search_for_needed_episodes, search_providers, snatch_episode,
    snatch_propers,
};

/// Finished manual/failed searches kept for status queries
const MANUAL_SEARCH_HISTORY_LEN: usize = 100;

/// What a search queue item does
#[derive(Debug, Clone)]
pub enum SearchKind {
    Daily,
    Backlog {
        show: TvShowRecord,
        segment: Vec<EpisodeRecord>,
    },
    Manual {
        show: TvShowRecord,
        episode: EpisodeRecord,
        down_cur_quality: bool,
    },
    Failed {
        show: TvShowRecord,
        segment: Vec<EpisodeRecord>,
    },
    Proper,
}

impl SearchKind {
    fn show_id(&self) -> Option<i64> {
        match self {
            SearchKind::Backlog { show, .. }
            | SearchKind::Manual { show, .. }
            | SearchKind::Failed { show, .. } => Some(show.id),
            SearchKind::Daily | SearchKind::Proper => None,
        }
    }

    fn episode_keys(&self) -> Vec<EpisodeKey> {
        match self {
            SearchKind::Backlog { segment, .. } | SearchKind::Failed { segment, .. } => {
                segment.iter().map(EpisodeRecord::key).collect()
            }
            SearchKind::Manual { episode, .. } => vec![episode.key()],
            SearchKind::Daily | SearchKind::Proper => Vec::new(),
        }
    }

    fn is_manual_or_failed(&self) -> bool {
        matches!(self, SearchKind::Manual { .. } | SearchKind::Failed { .. })
    }
}

pub struct SearchQueueItem {
    pub kind: SearchKind,
    success: Mutex<Option<bool>>,
}

impl SearchQueueItem {
    pub fn new(kind: SearchKind) -> Self {
        Self {
            kind,
            success: Mutex::new(None),
        }
    }

    /// Whether the search snatched something; `None` until it has run
    pub fn success(&self) -> Option<bool> {
        *self.success.lock()
    }

    fn set_success(&self, success: bool) {
        *self.success.lock() = Some(success);
    }
}

/// Shared state for search queue items
pub struct SearchQueueContext {
    pub search: Arc<SearchContext>,
    manual_history: Mutex<VecDeque<Arc<SearchQueueItem>>>,
}

impl SearchQueueContext {
    fn remember(&self, item: Arc<SearchQueueItem>) {
        let mut history = self.manual_history.lock();
        if history.len() == MANUAL_SEARCH_HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(item);
    }
}

#[async_trait]
impl QueueItem for SearchQueueItem {
    type Context = SearchQueueContext;

    fn name(&self) -> String {
        match &self.kind {
            SearchKind::Daily => "Daily Search".to_string(),
            SearchKind::Backlog { show, .. } => format!("Backlog-{}", show.indexer_id),
            SearchKind::Manual { show, .. } => format!("Manual-{}", show.indexer_id),
            SearchKind::Failed { show, .. } => format!("Retry-{}", show.indexer_id),
            SearchKind::Proper => "Proper Search".to_string(),
        }
    }

    fn priority(&self) -> QueuePriority {
        match self.kind {
            SearchKind::Daily | SearchKind::Proper => QueuePriority::Normal,
            SearchKind::Backlog { .. } => QueuePriority::Low,
            SearchKind::Manual { .. } | SearchKind::Failed { .. } => QueuePriority::High,
        }
    }

    async fn execute(self: Arc<Self>, ctx: Arc<SearchQueueContext>) -> Result<()> {
        let search = ctx.search.as_ref();

        match &self.kind {
            SearchKind::Daily => run_daily(search).await,
            SearchKind::Proper => run_proper(search).await,
            SearchKind::Backlog { show, segment } => run_backlog(search, show, segment).await,
            SearchKind::Manual {
                show,
                episode,
                down_cur_quality,
            } => {
                ctx.remember(self.clone());
                let outcome = run_manual(search, show, episode, *down_cur_quality).await;
                self.set_success(*outcome.as_ref().unwrap_or(&false));
                outcome.map(|_| ())
            }
            SearchKind::Failed { show, segment } => {
                ctx.remember(self.clone());
                let outcome = run_failed(search, show, segment).await;
                self.set_success(*outcome.as_ref().unwrap_or(&false));
                outcome.map(|_| ())
            }
        }
    }
}

async fn run_daily(ctx: &SearchContext) -> Result<()> {
    info!("Beginning daily search for new episodes");
    let results = search_for_needed_episodes(ctx).await?;

    if results.is_empty() {
        info!("No needed episodes found");
        return Ok(());
    }

    for result in &results {
        let Some(show) = ctx.db.tv_shows().get(result.show_id).await? else {
            continue;
        };
        info!(name = %result.name, provider = %result.provider, "Downloading from provider");
        snatch_episode(ctx, &show, result).await?;
    }

    Ok(())
}

async fn run_proper(ctx: &SearchContext) -> Result<()> {
    let propers = find_propers(ctx).await?;
    info!(count = propers.len(), "Found propers");

    if ctx.settings.download_propers && !propers.is_empty() {
        let snatched = snatch_propers(ctx, propers).await?;
        info!(count = snatched, "Snatched propers");
    }

    Ok(())
}

async fn run_backlog(ctx: &SearchContext, show: &TvShowRecord, segment: &[EpisodeRecord]) -> Result<()> {
    // The show may have been paused since the item was queued
    let Some(show) = ctx.db.tv_shows().get(show.id).await? else {
        return Ok(());
    };
    if show.paused {
        info!(show = %show.name, "Show is paused, skipping backlog search");
        return Ok(());
    }

    info!(show = %show.name, episodes = segment.len(), "Beginning backlog search");
    let results = search_providers(ctx, &show, segment, false, false).await?;

    if results.is_empty() {
        info!(show = %show.name, "No needed episodes found during backlog search");
        return Ok(());
    }

    for result in &results {
        info!(name = %result.name, provider = %result.provider, "Downloading from provider");
        snatch_episode(ctx, &show, result).await?;
    }

    Ok(())
}

async fn run_manual(
    ctx: &SearchContext,
    show: &TvShowRecord,
    episode: &EpisodeRecord,
    down_cur_quality: bool,
) -> Result<bool> {
    let pretty = episode.pretty_name(&show.name);
    info!(episode = %pretty, "Beginning manual search");

    let results = search_providers(ctx, show, std::slice::from_ref(episode), true, down_cur_quality).await?;

    match results.first() {
        Some(result) => {
            info!(name = %result.name, provider = %result.provider, "Downloading from provider");
            snatch_episode(ctx, show, result).await
        }
        None => {
            ctx.notifications.message(
                "No downloads were found",
                format!("Couldn't find a download for {}", pretty),
            );
            info!(episode = %pretty, "Unable to find a download");
            Ok(false)
        }
    }
}

async fn run_failed(ctx: &SearchContext, show: &TvShowRecord, segment: &[EpisodeRecord]) -> Result<bool> {
    for episode in segment {
        info!(episode = %episode.pretty_name(&show.name), "Marking episode as bad");
        ctx.db.failed().mark_failed(episode).await?;

        if let Some(release) = ctx.db.failed().find_release(show.id, episode.key()).await? {
            ctx.db
                .failed()
                .log_failed(&release.release, release.size, &release.provider)
                .await?;
            ctx.db
                .history()
                .log_failed(show.id, episode.key(), &release.release, &release.provider)
                .await?;
        }

        ctx.db.failed().revert_episode(episode).await?;
    }

    let results = search_providers(ctx, show, segment, true, false).await?;
    let mut success = false;
    for result in &results {
        info!(name = %result.name, provider = %result.provider, "Downloading from provider");
        if snatch_episode(ctx, show, result).await? {
            success = true;
        }
    }

    if results.is_empty() {
        warn!(show = %show.name, "No replacement release found for failed download");
    }

    Ok(success)
}

/// Where a manual or failed search stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualSearchState {
    Queued,
    Searching,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualSearchEntry {
    pub show_id: i64,
    pub episodes: Vec<EpisodeKey>,
    /// `manual` or `failed`
    pub search_type: &'static str,
    pub state: ManualSearchState,
    pub success: Option<bool>,
}

impl ManualSearchEntry {
    fn from_item(item: &SearchQueueItem, state: ManualSearchState) -> Option<Self> {
        let search_type = match item.kind {
            SearchKind::Manual { .. } => "manual",
            SearchKind::Failed { .. } => "failed",
            _ => return None,
        };
        Some(Self {
            show_id: item.kind.show_id()?,
            episodes: item.kind.episode_keys(),
            search_type,
            state,
            success: item.success(),
        })
    }
}

/// Number of waiting items per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueLength {
    pub backlog: usize,
    pub daily: usize,
    pub manual: usize,
    pub failed: usize,
    pub proper: usize,
}

pub struct SearchQueue {
    queue: GenericQueue<SearchQueueItem>,
}

impl SearchQueue {
    pub fn new(ctx: Arc<SearchContext>) -> Self {
        let context = Arc::new(SearchQueueContext {
            search: ctx,
            manual_history: Mutex::new(VecDeque::new()),
        });
        Self {
            queue: GenericQueue::new("SEARCHQUEUE", context),
        }
    }

    pub fn queue(&self) -> &GenericQueue<SearchQueueItem> {
        &self.queue
    }

    pub fn search_context(&self) -> &Arc<SearchContext> {
        &self.queue.context().search
    }

    /// Queue a search. Duplicates of waiting items are refused.
    pub fn add_item(&self, kind: SearchKind) -> Result<Uuid, QueueError> {
        self.queue
            .add_item_if(SearchQueueItem::new(kind), |item, queued, _| {
                let duplicate = match &item.kind {
                    SearchKind::Daily => queued.iter().any(|q| matches!(q.item.kind, SearchKind::Daily)),
                    SearchKind::Proper => queued.iter().any(|q| matches!(q.item.kind, SearchKind::Proper)),
                    SearchKind::Backlog { show, segment } => {
                        let keys: Vec<_> = segment.iter().map(EpisodeRecord::key).collect();
                        backlog_queued(queued, show.id, &keys)
                    }
                    SearchKind::Manual { .. } | SearchKind::Failed { .. } => {
                        let show_id = item.kind.show_id().unwrap_or_default();
                        item.kind
                            .episode_keys()
                            .iter()
                            .any(|key| episode_queued(queued, show_id, key))
                    }
                };
                duplicate.then(|| QueueError::AlreadyQueued(item.name()))
            })
    }

    /// Whether a backlog search for exactly this segment is waiting
    pub fn is_in_queue(&self, show_id: i64, segment: &[EpisodeKey]) -> bool {
        self.queue.inspect(|queued, _| backlog_queued(queued, show_id, segment))
    }

    /// Whether a manual or failed search for the episode is waiting
    pub fn is_ep_in_queue(&self, show_id: i64, key: &EpisodeKey) -> bool {
        self.queue.inspect(|queued, _| episode_queued(queued, show_id, key))
    }

    /// Hold back everything below high priority
    pub fn pause_backlog(&self) {
        info!("Pausing backlog searches");
        self.queue.set_min_priority(QueuePriority::High.value());
    }

    pub fn unpause_backlog(&self) {
        info!("Unpausing backlog searches");
        self.queue.set_min_priority(0);
    }

    pub fn is_backlog_paused(&self) -> bool {
        self.queue.min_priority() >= QueuePriority::Normal.value()
    }

    pub fn is_manualsearch_in_progress(&self) -> bool {
        self.any_item(SearchKind::is_manual_or_failed)
    }

    pub fn is_backlog_in_progress(&self) -> bool {
        self.any_item(|k| matches!(k, SearchKind::Backlog { .. }))
    }

    pub fn is_dailysearch_in_progress(&self) -> bool {
        self.any_item(|k| matches!(k, SearchKind::Daily))
    }

    fn any_item(&self, pred: impl Fn(&SearchKind) -> bool) -> bool {
        self.queue.inspect(|queued, current| {
            current.is_some_and(|c| pred(&c.item.kind)) || queued.iter().any(|q| pred(&q.item.kind))
        })
    }

    pub fn queue_length(&self) -> QueueLength {
        self.queue.inspect(|queued, _| {
            let mut length = QueueLength::default();
            for q in queued {
                match q.item.kind {
                    SearchKind::Daily => length.daily += 1,
                    SearchKind::Backlog { .. } => length.backlog += 1,
                    SearchKind::Manual { .. } => length.manual += 1,
                    SearchKind::Failed { .. } => length.failed += 1,
                    SearchKind::Proper => length.proper += 1,
                }
            }
            length
        })
    }

    /// Manual and failed searches for a show: waiting, running and finished
    pub fn manual_search_status(&self, show_id: i64) -> Vec<ManualSearchEntry> {
        let (mut entries, current_item) = self.queue.inspect(|queued, current| {
            let mut entries: Vec<ManualSearchEntry> = queued
                .iter()
                .filter_map(|q| ManualSearchEntry::from_item(&q.item, ManualSearchState::Queued))
                .collect();

            let current_item = current.map(|c| c.item.clone());
            if let Some(entry) = current
                .and_then(|c| ManualSearchEntry::from_item(&c.item, ManualSearchState::Searching))
            {
                entries.push(entry);
            }
            (entries, current_item)
        });

        let history = self.queue.context().manual_history.lock();
        entries.extend(
            history
                .iter()
                .filter(|item| !current_item.as_ref().is_some_and(|c| Arc::ptr_eq(c, item)))
                .filter_map(|item| ManualSearchEntry::from_item(item, ManualSearchState::Finished)),
        );

        entries.retain(|e| e.show_id == show_id);
        entries
    }

    pub fn run(&self) {
        self.queue.run();
    }

    pub async fn run_until_idle(&self) {
        self.queue.run_until_idle().await;
    }

    pub fn current(&self) -> Option<ItemSnapshot> {
        self.queue.current()
    }

    pub fn queued(&self) -> Vec<ItemSnapshot> {
        self.queue.queued()
    }
}

fn backlog_queued(queued: &[QueuedItem<SearchQueueItem>], show_id: i64, segment: &[EpisodeKey]) -> bool {
    queued.iter().any(|q| match &q.item.kind {
        SearchKind::Backlog { show, segment: queued_segment } => {
            show.id == show_id
                && queued_segment.len() == segment.len()
                && queued_segment.iter().zip(segment).all(|(e, k)| e.key() == *k)
        }
        _ => false,
    })
}

fn episode_queued(queued: &[QueuedItem<SearchQueueItem>], show_id: i64, key: &EpisodeKey) -> bool {
    queued.iter().any(|q| {
        q.item.kind.is_manual_or_failed()
            && q.item.kind.show_id() == Some(show_id)
            && q.item.kind.episode_keys().contains(key)
    })
}
