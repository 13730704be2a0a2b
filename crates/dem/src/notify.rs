//! Status change notifications
//!
//! Notifications are collected in an outbox while the state lock is held
//! and dispatched after it is released, to broadcast subscribers and to
//! synchronous listeners.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::ids::{ClientId, EventId};
use crate::status::UdsStatus;

/// Notification emitted by the Dem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// External event status changed
    EventStatusChanged {
        event: EventId,
        old: UdsStatus,
        new: UdsStatus,
    },
    /// External DTC status changed
    DtcStatusChanged { dtc: u32, old: UdsStatus, new: UdsStatus },
    /// Stored data of an event was captured or updated
    EventDataChanged { event: EventId },
    /// A clear request finished
    ClearDtcCompleted { client: ClientId, success: bool },
}

/// Synchronous notification sink
pub trait NotificationListener: Send + Sync {
    fn on_notification(&self, notification: &Notification);
}

/// Fans notifications out to subscribers and listeners
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
    listeners: RwLock<Vec<Arc<dyn NotificationListener>>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.sender.receiver_count())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.listeners.write().push(listener);
    }

    /// Deliver a batch; must not be called with the state lock held
    pub fn dispatch(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for notification in notifications {
            for listener in &listeners {
                listener.on_notification(&notification);
            }
            // No receivers is not an error
            if self.sender.send(notification).is_err() {
                trace!("No notification subscribers");
            }
        }
    }
}

/// Listener recording everything it receives
#[derive(Debug, Default)]
pub struct RecordingListener {
    received: parking_lot::Mutex<Vec<Notification>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.received.lock())
    }
}

impl NotificationListener for RecordingListener {
    fn on_notification(&self, notification: &Notification) {
        self.received.lock().push(notification.clone());
    }
}
