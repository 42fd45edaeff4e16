//! # Subscriber Registry
//!
//! Tracks the live set of subscriber channels.
//!
//! Membership follows the transport's lifecycle exactly: the server adds a
//! subscriber synchronously when a socket is accepted and removes it
//! synchronously when the socket closes. The registry holds a back-reference
//! to each channel; it never owns or closes the underlying transport.
//!
//! `all()` returns a copy of the membership taken under the lock, so a
//! fan-out iterates its own list while connects and disconnects proceed
//! concurrently. A subscriber removed while a fan-out is already iterating is
//! flagged as detached, and `Subscriber::deliver` refuses to send once that
//! flag is set.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;

/// Process-unique subscriber identifier.
pub type SubscriberId = u64;

/// Why a frame could not be handed to a channel.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel (or its subscriber) is gone.
    #[error("channel is closed")]
    Closed,
    /// The channel is open but can not take a frame right now.
    #[error("channel is not ready")]
    NotReady,
}

/// # Channel
///
/// The transport seam. An implementation wraps one open connection and must
/// not block: a frame that can not be taken immediately is refused with
/// `ChannelError::NotReady` and dropped by the caller.
pub trait Channel: Send + Sync {
    /// Liveness as seen by the transport.
    fn is_open(&self) -> bool;

    /// Hands one encoded frame to the transport.
    fn send(&self, frame: Arc<str>) -> Result<(), ChannelError>;
}

/// # MPSC Channel
///
/// `Channel` backed by a bounded `tokio::sync::mpsc` queue. The connection
/// task drains the receiving half into its socket; when the socket falls
/// behind and the queue is full, new frames are dropped.
#[derive(Debug, Clone)]
pub struct MpscChannel {
    sender: mpsc::Sender<Arc<str>>,
}

impl MpscChannel {
    /// Creates the channel and the receiver the connection task drains.
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl Channel for MpscChannel {
    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    fn send(&self, frame: Arc<str>) -> Result<(), ChannelError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::NotReady,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }
}

/// # Subscriber
///
/// Opaque handle to one connected channel.
pub struct Subscriber {
    id: SubscriberId,
    channel: Arc<dyn Channel>,
    detached: AtomicBool,
}

impl Subscriber {
    /// The subscriber's id.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// `true` while the subscriber is registered and its transport is open.
    pub fn is_open(&self) -> bool {
        !self.detached.load(Ordering::Acquire) && self.channel.is_open()
    }

    /// Whether the registry has let go of this subscriber.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Sends one frame unless the subscriber has been detached.
    pub fn deliver(&self, frame: Arc<str>) -> Result<(), ChannelError> {
        if self.is_detached() {
            return Err(ChannelError::Closed);
        }
        self.channel.send(frame)
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("detached", &self.is_detached())
            .finish()
    }
}

/// # Subscriber Registry
///
/// Thread-safe map of live subscribers, keyed by id.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    members: Mutex<HashMap<SubscriberId, Arc<Subscriber>>>,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `channel` in a new subscriber with a fresh id. The subscriber is
    /// not a member until passed to `add`.
    pub fn new_subscriber(&self, channel: Arc<dyn Channel>) -> Arc<Subscriber> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Arc::new(Subscriber {
            id,
            channel,
            detached: AtomicBool::new(false),
        })
    }

    /// Adds `subscriber`. Adding the same subscriber twice is a no-op and
    /// returns `false`.
    pub fn add(&self, subscriber: &Arc<Subscriber>) -> bool {
        let mut members = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        if members.contains_key(&subscriber.id) {
            return false;
        }
        members.insert(subscriber.id, Arc::clone(subscriber));
        true
    }

    /// Removes the subscriber with `id` and detaches it, so an in-flight
    /// fan-out holding an older membership list skips it.
    pub fn remove(&self, id: SubscriberId) -> Option<Arc<Subscriber>> {
        let removed = self
            .members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(subscriber) = &removed {
            subscriber.detach();
        }
        removed
    }

    /// Copy of the membership at call time.
    pub fn all(&self) -> Vec<Arc<Subscriber>> {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Whether `id` is currently a member.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
