//! # Fan-out Dispatcher
//!
//! Encodes messages for the wire and delivers them to subscribers.
//!
//! ## Core Design Principles:
//!
//! 1.  **Encode Once**: a message is serialized a single time into an
//!     `Arc<str>`. Every subscriber receives a clone of the same pointer, so
//!     fan-out cost does not grow with the payload size.
//!
//! 2.  **Best Effort**: a subscriber whose channel is closed is skipped
//!     silently. A channel that is not ready loses that frame. Nothing is
//!     retried or buffered here, and one failed send never stops delivery to
//!     the remaining subscribers.
//!
//! 3.  **No Error Frames**: the protocol has two message kinds, `full` and
//!     `update`. Failures are logged on the server side only.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::core::diff::ChangeSet;
use crate::core::registry::{Subscriber, SubscriberRegistry};
use crate::core::snapshot::Snapshot;

/// # Wire Message
///
/// `{"type": "full", "data": {...}}` carries a whole snapshot,
/// `{"type": "update", "data": {...}}` carries a change set where `null`
/// marks a removed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WireMessage {
    /// Complete snapshot, sent once to a subscriber when it connects.
    Full(Snapshot),
    /// Incremental change set, broadcast after a refresh.
    Update(ChangeSet),
}

/// Borrowing twin of `WireMessage`, so encoding never clones the payload.
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
enum Outgoing<'a> {
    Full(&'a Snapshot),
    Update(&'a ChangeSet),
}

/// Encodes a `full` message.
pub fn encode_full(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string(&Outgoing::Full(snapshot))
}

/// Encodes an `update` message.
pub fn encode_update(changes: &ChangeSet) -> serde_json::Result<String> {
    serde_json::to_string(&Outgoing::Update(changes))
}

/// Per-broadcast tally, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers that accepted the frame.
    pub delivered: usize,
    /// Subscribers that were closed, detached or not ready.
    pub skipped: usize,
}

/// # Dispatcher
///
/// Delivers encoded frames to the members of a `SubscriberRegistry`.
pub struct Dispatcher {
    registry: Arc<SubscriberRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// # Broadcast Changes
    ///
    /// Sends `{type: update, data: changes}` to every registered subscriber
    /// whose channel is open. An empty change set is never sent.
    pub fn broadcast_changes(&self, changes: &ChangeSet) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if changes.is_empty() {
            return report;
        }

        let frame: Arc<str> = match encode_update(changes) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!(error = %e, "Failed to encode update message");
                return report;
            }
        };

        for subscriber in self.registry.all() {
            if !subscriber.is_open() {
                report.skipped += 1;
                continue;
            }
            match subscriber.deliver(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(subscriber = subscriber.id(), error = %e, "Update dropped");
                    report.skipped += 1;
                }
            }
        }

        report
    }

    /// # Send Full Snapshot
    ///
    /// Sends `{type: full, data: snapshot}` to exactly one subscriber.
    /// Returns whether the channel accepted it.
    pub fn send_full_snapshot(&self, subscriber: &Subscriber, snapshot: &Snapshot) -> bool {
        let frame = match encode_full(snapshot) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!(error = %e, "Failed to encode full message");
                return false;
            }
        };

        match subscriber.deliver(frame) {
            Ok(()) => true,
            Err(e) => {
                debug!(subscriber = subscriber.id(), error = %e, "Full snapshot dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff::Change;

    #[test]
    fn full_message_shape() {
        let snapshot: Snapshot = [("A".to_string(), 1.5)].into_iter().collect();
        let json: serde_json::Value = serde_json::from_str(&encode_full(&snapshot).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "full", "data": {"A": 1.5}}));
    }

    #[test]
    fn update_message_shape() {
        let changes: ChangeSet = [
            ("A".to_string(), Change::Removed),
            ("B".to_string(), Change::Changed(3.0)),
        ]
        .into_iter()
        .collect();
        let text = encode_update(&changes).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json, serde_json::json!({"type": "update", "data": {"A": null, "B": 3.0}}));

        let decoded: WireMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, WireMessage::Update(changes));
    }

    #[test]
    fn empty_change_set_is_not_sent() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (channel, mut rx) = crate::core::registry::MpscChannel::new(4);
        let subscriber = registry.new_subscriber(Arc::new(channel));
        registry.add(&subscriber);

        let report = Dispatcher::new(registry).broadcast_changes(&ChangeSet::new());

        assert_eq!(report, DeliveryReport::default());
        assert!(rx.try_recv().is_err());
    }
}
