//! Work queues
//!
//! Searches and show updates are serialised through priority queues that run
//! one item at a time. A scheduler tick calls [`GenericQueue::run`] which
//! starts the next item once the current one has finished.

pub mod generic;
pub mod search;
pub mod show;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use generic::{GenericQueue, ItemSnapshot, QueuedItem};
pub use search::{
    ManualSearchEntry, ManualSearchState, QueueLength, SearchKind, SearchQueue, SearchQueueContext,
    SearchQueueItem,
};
pub use show::{AddShowOptions, ShowAction, ShowQueue, ShowQueueContext, ShowQueueItem};

/// Priority of a queued item; higher runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePriority {
    Low = 10,
    Normal = 20,
    High = 30,
}

impl QueuePriority {
    pub fn value(self) -> u32 {
        self as u32
    }
}

/// Errors returned when an item cannot be queued
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("{0} is already queued")]
    AlreadyQueued(String),

    #[error("show {0} is busy")]
    ShowBusy(i64),

    #[error("show {0} already exists")]
    AlreadyExists(i64),

    #[error("not found: {0}")]
    NotFound(String),
}

/// A unit of work for a [`GenericQueue`]
#[async_trait]
pub trait QueueItem: Send + Sync + 'static {
    /// Shared state every item of the queue runs against
    type Context: Send + Sync + 'static;

    fn name(&self) -> String;

    fn priority(&self) -> QueuePriority;

    async fn execute(self: Arc<Self>, ctx: Arc<Self::Context>) -> anyhow::Result<()>;
}
