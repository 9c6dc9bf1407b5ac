//! User notifications
//!
//! Two kinds of output live here: short UI messages that the web frontend
//! polls ("Episode snatched", "No downloads were found") and snatch events
//! fanned out to the configured [`Notifier`]s.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// How many UI messages are kept before the oldest is dropped
const MAX_MESSAGES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Error,
}

/// A message shown in the web UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiNotification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Something that wants to hear about snatches
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify_snatch(&self, ep_name: &str) -> Result<()>;
}

/// Writes snatch events to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify_snatch(&self, ep_name: &str) -> Result<()> {
        info!(episode = %ep_name, "Snatched episode");
        Ok(())
    }
}

pub struct NotificationService {
    messages: Mutex<VecDeque<UiNotification>>,
    notifiers: Vec<Arc<dyn Notifier>>,
    event_tx: broadcast::Sender<UiNotification>,
}

impl NotificationService {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            messages: Mutex::new(VecDeque::new()),
            notifiers: Vec::new(),
            event_tx,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Subscribe to new UI messages
    pub fn subscribe(&self) -> broadcast::Receiver<UiNotification> {
        self.event_tx.subscribe()
    }

    pub fn message(&self, title: impl Into<String>, body: impl Into<String>) {
        self.push(NotificationKind::Message, title.into(), body.into());
    }

    pub fn error(&self, title: impl Into<String>, body: impl Into<String>) {
        self.push(NotificationKind::Error, title.into(), body.into());
    }

    fn push(&self, kind: NotificationKind, title: String, body: String) {
        let notification = UiNotification {
            id: Uuid::new_v4(),
            kind,
            title,
            body,
            created_at: Utc::now(),
        };

        {
            let mut messages = self.messages.lock();
            if messages.len() == MAX_MESSAGES {
                messages.pop_front();
            }
            messages.push_back(notification.clone());
        }

        // No receivers is fine
        let _ = self.event_tx.send(notification);
    }

    /// Pending UI messages without consuming them
    pub fn pending(&self) -> Vec<UiNotification> {
        self.messages.lock().iter().cloned().collect()
    }

    /// Take every pending UI message
    pub fn drain(&self) -> Vec<UiNotification> {
        self.messages.lock().drain(..).collect()
    }

    /// Tell every notifier about a snatch. Failures are logged and swallowed.
    pub async fn notify_snatch(&self, ep_name: &str) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify_snatch(ep_name).await {
                debug!(notifier = notifier.name(), error = %e, "Failed to send snatch notification");
            }
        }
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Notifier for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn notify_snatch(&self, _ep_name: &str) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("remote end unavailable")
        }
    }

    #[test]
    fn test_messages_are_drained_once() {
        let service = NotificationService::new();
        service.message("Episode snatched", "Show.S01E01.720p-GRP");
        service.error("Search failed", "provider offline");

        assert_eq!(service.pending().len(), 2);
        let drained = service.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].kind, NotificationKind::Error);
        assert!(service.drain().is_empty());
    }

    #[test]
    fn test_oldest_message_dropped_when_full() {
        let service = NotificationService::new();
        for i in 0..MAX_MESSAGES + 5 {
            service.message("m", i.to_string());
        }

        let pending = service.pending();
        assert_eq!(pending.len(), MAX_MESSAGES);
        assert_eq!(pending[0].body, "5");
    }

    #[tokio::test]
    async fn test_notifier_errors_do_not_stop_fan_out() {
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let service = NotificationService::new()
            .with_notifier(counting.clone())
            .with_notifier(counting.clone())
            .with_notifier(Arc::new(LogNotifier));

        service.notify_snatch("Show - 1x01 - Pilot - HD TV").await;
        assert_eq!(counting.0.load(Ordering::SeqCst), 2);
    }
}
