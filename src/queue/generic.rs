//! Priority queue running one item at a time

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use super::{QueueError, QueueItem, QueuePriority};

/// An item waiting in (or started from) a queue
pub struct QueuedItem<T> {
    pub id: Uuid,
    pub item: Arc<T>,
    pub added: DateTime<Utc>,
    seq: u64,
}

impl<T> Clone for QueuedItem<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            item: self.item.clone(),
            added: self.added,
            seq: self.seq,
        }
    }
}

/// Serializable view of a queued or running item
#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    pub id: Uuid,
    pub name: String,
    pub priority: QueuePriority,
    pub added: DateTime<Utc>,
}

impl<T: QueueItem> QueuedItem<T> {
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            name: self.item.name(),
            priority: self.item.priority(),
            added: self.added,
        }
    }
}

struct Running<T> {
    entry: QueuedItem<T>,
    handle: JoinHandle<()>,
}

struct QueueState<T> {
    queue: Vec<QueuedItem<T>>,
    current: Option<Running<T>>,
    min_priority: u32,
    next_seq: u64,
}

/// The current item, unless it has already finished and only waits to be reaped
fn running_entry<T>(state: &QueueState<T>) -> Option<&QueuedItem<T>> {
    state
        .current
        .as_ref()
        .filter(|r| !r.handle.is_finished())
        .map(|r| &r.entry)
}

pub struct GenericQueue<T: QueueItem> {
    name: String,
    context: Arc<T::Context>,
    state: Mutex<QueueState<T>>,
}

impl<T: QueueItem> GenericQueue<T> {
    pub fn new(name: impl Into<String>, context: Arc<T::Context>) -> Self {
        Self {
            name: name.into(),
            context,
            state: Mutex::new(QueueState {
                queue: Vec::new(),
                current: None,
                min_priority: 0,
                next_seq: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<T::Context> {
        &self.context
    }

    /// Queue an item unconditionally
    pub fn add_item(&self, item: T) -> Uuid {
        let mut state = self.state.lock();
        Self::push(&self.name, &mut state, item)
    }

    /// Queue an item unless `reject` finds a reason not to. `reject` sees the
    /// waiting items and the running one under the queue lock.
    pub fn add_item_if<F>(&self, item: T, reject: F) -> Result<Uuid, QueueError>
    where
        F: FnOnce(&T, &[QueuedItem<T>], Option<&QueuedItem<T>>) -> Option<QueueError>,
    {
        let mut state = self.state.lock();
        if let Some(err) = reject(&item, &state.queue, running_entry(&state)) {
            debug!(queue = %self.name, item = %item.name(), error = %err, "Not adding item");
            return Err(err);
        }
        Ok(Self::push(&self.name, &mut state, item))
    }

    /// Like [`add_item_if`](Self::add_item_if), but `decide` may also answer
    /// `Ok(false)` to drop the item quietly, giving `Ok(None)`.
    pub fn add_item_when<F>(&self, item: T, decide: F) -> Result<Option<Uuid>, QueueError>
    where
        F: FnOnce(&T, &[QueuedItem<T>], Option<&QueuedItem<T>>) -> Result<bool, QueueError>,
    {
        let mut state = self.state.lock();
        match decide(&item, &state.queue, running_entry(&state)) {
            Err(err) => {
                debug!(queue = %self.name, item = %item.name(), error = %err, "Not adding item");
                Err(err)
            }
            Ok(false) => {
                debug!(queue = %self.name, item = %item.name(), "Skipping item");
                Ok(None)
            }
            Ok(true) => Ok(Some(Self::push(&self.name, &mut state, item))),
        }
    }

    fn push(name: &str, state: &mut QueueState<T>, item: T) -> Uuid {
        let entry = QueuedItem {
            id: Uuid::new_v4(),
            item: Arc::new(item),
            added: Utc::now(),
            seq: state.next_seq,
        };
        state.next_seq += 1;
        debug!(queue = %name, item = %entry.item.name(), priority = ?entry.item.priority(), "Added item to queue");
        let id = entry.id;
        state.queue.push(entry);
        id
    }

    /// Start the next item if nothing is running. Called on every scheduler
    /// tick.
    pub fn run(&self) {
        let mut state = self.state.lock();

        if state.current.as_ref().is_some_and(|r| r.handle.is_finished()) {
            if let Some(finished) = state.current.take() {
                if let Some(Err(e)) = finished.handle.now_or_never() {
                    error!(queue = %self.name, item = %finished.entry.item.name(), error = %e, "Queue item panicked");
                }
            }
        }

        if state.current.is_some() || state.queue.is_empty() {
            return;
        }

        state.queue.sort_by(|a, b| {
            b.item
                .priority()
                .cmp(&a.item.priority())
                .then(a.added.cmp(&b.added))
                .then(a.seq.cmp(&b.seq))
        });

        if state.queue[0].item.priority().value() < state.min_priority {
            return;
        }

        let entry = state.queue.remove(0);
        let item = entry.item.clone();
        let ctx = self.context.clone();
        let span = info_span!("queue_item", queue = %self.name, item = %item.name());

        let handle = tokio::spawn(
            async move {
                info!("Beginning queue item");
                match item.execute(ctx).await {
                    Ok(()) => info!("Finished queue item"),
                    Err(e) => error!(error = %e, "Queue item failed"),
                }
            }
            .instrument(span),
        );

        state.current = Some(Running { entry, handle });
    }

    /// Keep starting items until the queue is empty and idle, or only items
    /// below the minimum priority remain
    pub async fn run_until_idle(&self) {
        loop {
            self.run();
            {
                let state = self.state.lock();
                let blocked = state
                    .queue
                    .iter()
                    .all(|q| q.item.priority().value() < state.min_priority);
                if state.current.is_none() && blocked {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stop starting new items
    pub fn pause(&self) {
        info!(queue = %self.name, "Pausing queue");
        self.state.lock().min_priority = u32::MAX;
    }

    pub fn unpause(&self) {
        info!(queue = %self.name, "Unpausing queue");
        self.state.lock().min_priority = 0;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().min_priority == u32::MAX
    }

    pub fn min_priority(&self) -> u32 {
        self.state.lock().min_priority
    }

    /// Only start items of at least this priority
    pub fn set_min_priority(&self, priority: u32) {
        self.state.lock().min_priority = priority;
    }

    /// Run `f` over the waiting items and the running one under the lock
    pub fn inspect<R>(&self, f: impl FnOnce(&[QueuedItem<T>], Option<&QueuedItem<T>>) -> R) -> R {
        let state = self.state.lock();
        f(&state.queue, running_entry(&state))
    }

    pub fn current(&self) -> Option<ItemSnapshot> {
        self.inspect(|_, current| current.map(QueuedItem::snapshot))
    }

    pub fn queued(&self) -> Vec<ItemSnapshot> {
        self.inspect(|queue, _| queue.iter().map(QueuedItem::snapshot).collect())
    }

    /// Number of waiting items
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an item is running
    pub fn is_busy(&self) -> bool {
        self.inspect(|_, current| current.is_some())
    }
}
