//! Show queue: adding, updating, refreshing and removing shows

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::generic::{GenericQueue, ItemSnapshot, QueuedItem};
use super::search::{SearchKind, SearchQueue};
use super::{QueueError, QueueItem, QueuePriority};
use crate::common::{CompositeStatus, EpisodeStatus, QualityProfile};
use crate::db::{CreateTvShow, Database, TvShowRecord, UpsertEpisode};
use crate::search::needed::backlog_segments;
use crate::services::{EpisodeMetadata, MetadataSource, NotificationService};

/// Settings for a show being added
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddShowOptions {
    pub indexer_id: i64,
    #[serde(default = "QualityProfile::sd")]
    pub quality: QualityProfile,
    /// Status for episodes that have already aired
    #[serde(default = "default_status")]
    pub default_status: EpisodeStatus,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

fn default_status() -> EpisodeStatus {
    EpisodeStatus::Skipped
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShowAction {
    Add(AddShowOptions),
    Refresh { show: TvShowRecord },
    Update { show: TvShowRecord, force: bool },
    Remove { show: TvShowRecord },
}

impl ShowAction {
    /// Indexer ID of the show the action is about
    fn indexer_id(&self) -> i64 {
        match self {
            ShowAction::Add(options) => options.indexer_id,
            ShowAction::Refresh { show } | ShowAction::Update { show, .. } | ShowAction::Remove { show } => {
                show.indexer_id
            }
        }
    }
}

pub struct ShowQueueItem {
    pub action: ShowAction,
}

/// Shared state for show queue items
pub struct ShowQueueContext {
    pub db: Database,
    pub metadata: Arc<dyn MetadataSource>,
    pub search_queue: Arc<SearchQueue>,
    pub notifications: Arc<NotificationService>,
}

#[async_trait]
impl QueueItem for ShowQueueItem {
    type Context = ShowQueueContext;

    fn name(&self) -> String {
        match &self.action {
            ShowAction::Add(options) => format!("Add-{}", options.indexer_id),
            ShowAction::Refresh { show } => format!("Refresh-{}", show.indexer_id),
            ShowAction::Update { show, force: false } => format!("Update-{}", show.indexer_id),
            ShowAction::Update { show, force: true } => format!("ForceUpdate-{}", show.indexer_id),
            ShowAction::Remove { show } => format!("Remove-{}", show.indexer_id),
        }
    }

    fn priority(&self) -> QueuePriority {
        match self.action {
            ShowAction::Refresh { .. } => QueuePriority::High,
            _ => QueuePriority::Normal,
        }
    }

    async fn execute(self: Arc<Self>, ctx: Arc<ShowQueueContext>) -> Result<()> {
        match &self.action {
            ShowAction::Add(options) => run_add(&ctx, options).await,
            ShowAction::Refresh { show } => run_refresh(&ctx.db, show.id).await.map(|_| ()),
            ShowAction::Update { show, .. } => run_update(&ctx, show).await,
            ShowAction::Remove { show } => run_remove(&ctx, show).await,
        }
    }
}

/// Status for a newly discovered episode
fn initial_status(episode: &EpisodeMetadata, default: EpisodeStatus, today: NaiveDate) -> EpisodeStatus {
    match episode.airdate {
        Some(date) if date <= today => {
            if episode.season > 0 {
                default
            } else {
                EpisodeStatus::Skipped
            }
        }
        _ => EpisodeStatus::Unaired,
    }
}

async fn store_episodes(
    db: &Database,
    show: &TvShowRecord,
    episodes: &[EpisodeMetadata],
    default: EpisodeStatus,
) -> Result<usize> {
    let today = Utc::now().date_naive();
    let mut created = 0;

    for episode in episodes {
        let status = initial_status(episode, default, today);
        let input = UpsertEpisode {
            show_id: show.id,
            season: episode.season,
            episode: episode.episode,
            name: episode.name.clone(),
            airdate: episode.airdate,
            initial_status: CompositeStatus::plain(status).encode(),
        };
        if db.episodes().upsert(&input).await? {
            created += 1;
        }
    }

    Ok(created)
}

async fn run_add(ctx: &ShowQueueContext, options: &AddShowOptions) -> Result<()> {
    if ctx.db.tv_shows().get_by_indexer_id(options.indexer_id).await?.is_some() {
        warn!(indexer_id = options.indexer_id, "Show is already in the database");
        ctx.notifications.error(
            "Unable to add show",
            format!("Show {} is already in your show list", options.indexer_id),
        );
        return Ok(());
    }

    let metadata = match ctx.metadata.get_show(options.indexer_id).await {
        Ok(metadata) => metadata,
        Err(e) => {
            ctx.notifications.error(
                "Unable to add show",
                format!("Unable to look up show {} on the indexer", options.indexer_id),
            );
            return Err(e.context(format!("Failed to look up show {}", options.indexer_id)));
        }
    };

    let show = ctx
        .db
        .tv_shows()
        .create(CreateTvShow {
            indexer_id: metadata.indexer_id,
            tvdb_id: metadata.tvdb_id,
            name: metadata.name.clone(),
            aliases: options.aliases.clone(),
            quality: options.quality.clone(),
            paused: options.paused,
            is_anime: metadata.is_anime,
            default_ep_status: Some(options.default_status),
            whitelist: options.whitelist.clone(),
            blacklist: options.blacklist.clone(),
            ..Default::default()
        })
        .await?;

    let episodes = ctx
        .metadata
        .get_episodes(options.indexer_id)
        .await
        .with_context(|| format!("Failed to load episodes of {}", show.name))?;
    let created = store_episodes(&ctx.db, &show, &episodes, options.default_status).await?;
    info!(show = %show.name, episodes = created, "Show added");

    if options.default_status == EpisodeStatus::Wanted && !show.paused {
        let segments = backlog_segments(&ctx.db, &show, NaiveDate::MIN).await?;
        for (season, segment) in segments {
            debug!(show = %show.name, season, "Queueing backlog search for new show");
            if let Err(e) = ctx.search_queue.add_item(SearchKind::Backlog {
                show: show.clone(),
                segment,
            }) {
                debug!(show = %show.name, season, error = %e, "Backlog search not queued");
            }
        }
    }

    ctx.notifications.message("Show added", &show.name);
    Ok(())
}

/// Move aired `Unaired` episodes to their searchable status. Returns how many
/// episodes changed.
async fn run_refresh(db: &Database, show_id: i64) -> Result<usize> {
    let today = Utc::now().date_naive();
    let mut changed = 0;

    for episode in db.episodes().list_by_show(show_id).await? {
        if episode.composite().status != EpisodeStatus::Unaired || !episode.has_aired(today) {
            continue;
        }
        let status = EpisodeStatus::once_aired(episode.season);
        db.episodes()
            .update_status(episode.id, CompositeStatus::plain(status))
            .await?;
        changed += 1;
    }

    debug!(show_id, changed, "Refreshed episode statuses");
    Ok(changed)
}

async fn run_update(ctx: &ShowQueueContext, show: &TvShowRecord) -> Result<()> {
    let metadata = ctx
        .metadata
        .get_show(show.indexer_id)
        .await
        .with_context(|| format!("Failed to look up {}", show.name))?;

    if metadata.name != show.name {
        info!(old = %show.name, new = %metadata.name, "Show was renamed on the indexer");
        ctx.db
            .tv_shows()
            .update_names(show.id, &metadata.name, &show.aliases)
            .await?;
    }

    let episodes = ctx
        .metadata
        .get_episodes(show.indexer_id)
        .await
        .with_context(|| format!("Failed to load episodes of {}", show.name))?;
    let created = store_episodes(&ctx.db, show, &episodes, show.default_ep_status).await?;
    info!(show = %show.name, new_episodes = created, "Show updated");

    run_refresh(&ctx.db, show.id).await?;
    Ok(())
}

async fn run_remove(ctx: &ShowQueueContext, show: &TvShowRecord) -> Result<()> {
    let episodes = ctx.db.episodes().delete_by_show(show.id).await?;
    ctx.db.tv_shows().delete(show.id).await?;
    info!(show = %show.name, episodes, "Show removed");
    ctx.notifications.message("Show removed", &show.name);
    Ok(())
}

pub struct ShowQueue {
    queue: GenericQueue<ShowQueueItem>,
}

type Matcher = fn(&ShowAction) -> bool;

impl ShowQueue {
    pub fn new(ctx: Arc<ShowQueueContext>) -> Self {
        Self {
            queue: GenericQueue::new("SHOWQUEUE", ctx),
        }
    }

    pub fn queue(&self) -> &GenericQueue<ShowQueueItem> {
        &self.queue
    }

    /// Whether an update for the show is waiting to run
    pub fn is_in_update_queue(&self, show: &TvShowRecord) -> bool {
        self.queue
            .inspect(|queued, _| waiting_in(queued, show.indexer_id, is_update))
    }

    /// Indexer IDs of shows waiting to be added or being added
    pub fn loading_shows(&self) -> Vec<i64> {
        self.queue.inspect(|queued, current| {
            current
                .into_iter()
                .chain(queued.iter())
                .filter(|q| is_add(&q.item.action))
                .map(|q| q.item.action.indexer_id())
                .collect()
        })
    }

    pub fn add_show(&self, options: AddShowOptions) -> Result<Uuid, QueueError> {
        let indexer_id = options.indexer_id;
        self.queue.add_item_if(
            ShowQueueItem {
                action: ShowAction::Add(options),
            },
            |item, queued, current| {
                (running_in(current, indexer_id, is_add) || waiting_in(queued, indexer_id, is_add))
                    .then(|| QueueError::AlreadyQueued(item.name()))
            },
        )
    }

    pub fn update_show(&self, show: &TvShowRecord, force: bool) -> Result<Uuid, QueueError> {
        let (show_id, indexer_id) = (show.id, show.indexer_id);
        self.queue.add_item_if(
            ShowQueueItem {
                action: ShowAction::Update {
                    show: show.clone(),
                    force,
                },
            },
            |item, queued, current| {
                let adding = running_in(current, indexer_id, is_add) || waiting_in(queued, indexer_id, is_add);
                if adding || running_in(current, indexer_id, is_update) {
                    Some(QueueError::ShowBusy(show_id))
                } else if !force && waiting_in(queued, indexer_id, is_update) {
                    Some(QueueError::AlreadyQueued(item.name()))
                } else {
                    None
                }
            },
        )
    }

    /// Queue a refresh. `Ok(None)` when an update is already going to do it.
    pub fn refresh_show(&self, show: &TvShowRecord, force: bool) -> Result<Option<Uuid>, QueueError> {
        let indexer_id = show.indexer_id;
        self.queue.add_item_when(
            ShowQueueItem {
                action: ShowAction::Refresh { show: show.clone() },
            },
            |item, queued, current| {
                if !force && running_in(current, indexer_id, is_refresh) {
                    return Err(QueueError::AlreadyQueued(item.name()));
                }
                let updating = running_in(current, indexer_id, is_update) || waiting_in(queued, indexer_id, is_update);
                if !force && updating {
                    debug!(
                        show = %item.name(),
                        "An update is queued or running and will refresh the show, skipping refresh"
                    );
                    return Ok(false);
                }
                if waiting_in(queued, indexer_id, is_refresh) {
                    return Err(QueueError::AlreadyQueued(item.name()));
                }
                Ok(true)
            },
        )
    }

    pub fn remove_show(&self, show: &TvShowRecord) -> Result<Uuid, QueueError> {
        let (show_id, indexer_id) = (show.id, show.indexer_id);
        self.queue.add_item_if(
            ShowQueueItem {
                action: ShowAction::Remove { show: show.clone() },
            },
            |item, queued, current| {
                if running_in(current, indexer_id, is_remove) {
                    Some(QueueError::ShowBusy(show_id))
                } else {
                    waiting_in(queued, indexer_id, is_remove).then(|| QueueError::AlreadyQueued(item.name()))
                }
            },
        )
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

fn running_in(current: Option<&QueuedItem<ShowQueueItem>>, indexer_id: i64, matcher: Matcher) -> bool {
    current.is_some_and(|c| c.item.action.indexer_id() == indexer_id && matcher(&c.item.action))
}

fn waiting_in(queued: &[QueuedItem<ShowQueueItem>], indexer_id: i64, matcher: Matcher) -> bool {
    queued
        .iter()
        .any(|q| q.item.action.indexer_id() == indexer_id && matcher(&q.item.action))
}

fn is_add(action: &ShowAction) -> bool {
    matches!(action, ShowAction::Add(_))
}

fn is_update(action: &ShowAction) -> bool {
    matches!(action, ShowAction::Update { .. })
}

fn is_refresh(action: &ShowAction) -> bool {
    matches!(action, ShowAction::Refresh { .. })
}

fn is_remove(action: &ShowAction) -> bool {
    matches!(action, ShowAction::Remove { .. })
}
