//! # Hub
//!
//! Single writer of the snapshot store and owner of the subscriber set.
//!
//! Connect and publish share one lock. A subscriber connecting while a
//! refresh is being published therefore observes either
//!
//! - the old snapshot as its `full` message, followed by the `update`, or
//! - the new snapshot as its `full` message, and no `update` for it,
//!
//! but never an update for a change that its full snapshot already contains.
//! The lock is held only across non-blocking work (diff, pointer swap,
//! `try_send` into each channel), never across a fetch.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::core::diff::{diff, ChangeSet};
use crate::core::dispatcher::Dispatcher;
use crate::core::registry::{Channel, Subscriber, SubscriberId, SubscriberRegistry};
use crate::core::snapshot::{Snapshot, SnapshotStore};

/// # Hub
///
/// Shared between the refresh scheduler and the connection handlers,
/// usually behind an `Arc`.
pub struct Hub {
    store: SnapshotStore,
    registry: Arc<SubscriberRegistry>,
    dispatcher: Dispatcher,
    publish_lock: Mutex<()>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    /// Creates a hub with an empty snapshot and no subscribers.
    pub fn new() -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        Self {
            store: SnapshotStore::new(),
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            publish_lock: Mutex::new(()),
        }
    }

    /// # Connect
    ///
    /// Registers `channel` as a new subscriber and sends it the current
    /// snapshot as a `full` message.
    pub fn connect(&self, channel: Arc<dyn Channel>) -> Arc<Subscriber> {
        let _guard = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let subscriber = self.registry.new_subscriber(channel);
        self.registry.add(&subscriber);
        let snapshot = self.store.current();
        self.dispatcher.send_full_snapshot(&subscriber, &snapshot);

        info!(
            subscriber = subscriber.id(),
            live = self.registry.len(),
            items = snapshot.len(),
            "New client connected"
        );
        subscriber
    }

    /// # Disconnect
    ///
    /// Removes the subscriber. Returns `false` if it was not registered.
    pub fn disconnect(&self, id: SubscriberId) -> bool {
        let removed = self.registry.remove(id).is_some();
        if removed {
            info!(subscriber = id, live = self.registry.len(), "Client disconnected");
        }
        removed
    }

    /// # Publish
    ///
    /// Diffs `next` against the current snapshot. When anything changed the
    /// store is replaced and the change set is broadcast. The (possibly
    /// empty) change set is returned.
    pub fn publish(&self, next: Snapshot) -> ChangeSet {
        let _guard = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.store.current();
        let changes = diff(&current, &next);
        if changes.is_empty() {
            return changes;
        }

        self.store.replace(next);
        let report = self.dispatcher.broadcast_changes(&changes);
        debug!(
            changes = changes.len(),
            delivered = report.delivered,
            skipped = report.skipped,
            "Update broadcast"
        );
        changes
    }

    /// Read-only view of the current snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.store.current()
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether `id` is still connected.
    pub fn is_connected(&self, id: SubscriberId) -> bool {
        self.registry.contains(id)
    }
}
