use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::db::models::Notification;
use crate::error::AppResult;

pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Shortest poll interval `InboxMirror::run` will use.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// The subscriber missed events and must reload from the store.
    Resync,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
            ChangeKind::Resync => "RESYNC",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationChange {
    pub kind: ChangeKind,
    pub user_id: String,
    /// `None` on an `Update` means several rows changed at once.
    pub notification_id: Option<String>,
    pub notification: Option<Notification>,
}

impl NotificationChange {
    pub fn inserted(n: &Notification) -> Self {
        Self::for_row(ChangeKind::Insert, n)
    }

    pub fn updated(n: &Notification) -> Self {
        Self::for_row(ChangeKind::Update, n)
    }

    pub fn deleted(n: &Notification) -> Self {
        Self {
            kind: ChangeKind::Delete,
            user_id: n.user_id.clone(),
            notification_id: Some(n.id.clone()),
            notification: None,
        }
    }

    pub fn bulk_updated(user_id: &str) -> Self {
        Self {
            kind: ChangeKind::Update,
            user_id: user_id.to_string(),
            notification_id: None,
            notification: None,
        }
    }

    pub fn resync(user_id: &str) -> Self {
        Self {
            kind: ChangeKind::Resync,
            user_id: user_id.to_string(),
            notification_id: None,
            notification: None,
        }
    }

    fn for_row(kind: ChangeKind, n: &Notification) -> Self {
        Self {
            kind,
            user_id: n.user_id.clone(),
            notification_id: Some(n.id.clone()),
            notification: Some(n.clone()),
        }
    }
}

// ============================================================================
// Change Feed
// ============================================================================

/// In-process fan-out of committed notification changes.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<NotificationChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, change: NotificationChange) {
        // No subscribers is the common case outside of open streams.
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self, user_id: &str) -> UserChanges {
        UserChanges {
            user_id: user_id.to_string(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A feed subscription narrowed to one recipient.
pub struct UserChanges {
    user_id: String,
    rx: broadcast::Receiver<NotificationChange>,
}

impl UserChanges {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Next change for this user. Returns `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<NotificationChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.user_id == self.user_id => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        skipped,
                        "Change subscriber lagged, requesting resync"
                    );
                    return Some(NotificationChange::resync(&self.user_id));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ============================================================================
// Inbox Mirror
// ============================================================================

#[async_trait]
pub trait InboxSource: Send + Sync {
    async fn fetch_recent(&self, user_id: &str, limit: i64) -> AppResult<Vec<Notification>>;
    async fn fetch_unread_count(&self, user_id: &str) -> AppResult<i64>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InboxSnapshot {
    pub items: Vec<Notification>,
    pub unread_count: i64,
}

/// Client-side copy of a user's most recent notifications, kept current from
/// the change feed with a periodic poll as backstop.
pub struct InboxMirror<S> {
    source: S,
    user_id: String,
    capacity: usize,
    snapshot: InboxSnapshot,
}

impl<S: InboxSource> InboxMirror<S> {
    pub fn new(source: S, user_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            source,
            user_id: user_id.into(),
            capacity: capacity.max(1),
            snapshot: InboxSnapshot::default(),
        }
    }

    pub fn snapshot(&self) -> &InboxSnapshot {
        &self.snapshot
    }

    pub async fn resync(&mut self) -> AppResult<()> {
        let (items, unread_count) = tokio::try_join!(
            self.source.fetch_recent(&self.user_id, self.capacity as i64),
            self.source.fetch_unread_count(&self.user_id),
        )?;
        self.snapshot = InboxSnapshot {
            items,
            unread_count,
        };
        Ok(())
    }

    /// Apply one change. The unread count is always re-fetched rather than
    /// adjusted locally.
    pub async fn apply(&mut self, change: &NotificationChange) -> AppResult<()> {
        if change.user_id != self.user_id {
            return Ok(());
        }

        match (change.kind, change.notification.as_ref()) {
            (ChangeKind::Insert, Some(n)) => {
                self.snapshot.items.retain(|existing| existing.id != n.id);
                self.snapshot.items.insert(0, n.clone());
                self.snapshot.items.truncate(self.capacity);
            }
            (ChangeKind::Update, Some(n)) => {
                if let Some(existing) = self.snapshot.items.iter_mut().find(|e| e.id == n.id) {
                    *existing = n.clone();
                }
            }
            (ChangeKind::Delete, _) => {
                if let Some(id) = change.notification_id.as_deref() {
                    self.snapshot.items.retain(|existing| existing.id != id);
                }
            }
            _ => return self.resync().await,
        }

        self.snapshot.unread_count = self.source.fetch_unread_count(&self.user_id).await?;
        Ok(())
    }

    /// Follow `changes` until the feed closes or `shutdown` fires, polling
    /// every `poll_interval` (at least `MIN_POLL_INTERVAL`). Each new state is
    /// sent on `updates`.
    pub async fn run(
        mut self,
        mut changes: UserChanges,
        poll_interval: Duration,
        updates: watch::Sender<InboxSnapshot>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Self {
        if let Err(e) = self.resync().await {
            tracing::warn!(user_id = %self.user_id, "Initial inbox load failed: {:?}", e);
        }
        let _ = updates.send(self.snapshot.clone());

        let mut poll = tokio::time::interval(poll_interval.max(MIN_POLL_INTERVAL));
        poll.tick().await;

        loop {
            let result = tokio::select! {
                _ = shutdown.recv() => break,
                change = changes.next() => match change {
                    Some(change) => self.apply(&change).await,
                    None => break,
                },
                _ = poll.tick() => self.resync().await,
            };

            match result {
                Ok(()) => {
                    let _ = updates.send(self.snapshot.clone());
                }
                Err(e) => {
                    tracing::warn!(user_id = %self.user_id, "Inbox refresh failed: {:?}", e);
                }
            }
        }

        self
    }
}
