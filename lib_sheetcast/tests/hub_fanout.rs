//! Connect, publish and disconnect behavior of the hub, driven through
//! recording channels.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use common::{snap, RecordingChannel};
use lib_sheetcast::{Change, Channel, ChannelError, Hub, WireMessage};

#[test]
fn connect_sends_exactly_one_full_snapshot() {
    let hub = Hub::new();
    hub.publish(snap(&[("A", 1.0), ("B", 2.0)]));

    let channel = RecordingChannel::new();
    let subscriber = hub.connect(channel.clone());

    assert!(hub.is_connected(subscriber.id()));
    assert_eq!(hub.subscriber_count(), 1);
    assert_eq!(
        channel.messages(),
        vec![WireMessage::Full(snap(&[("A", 1.0), ("B", 2.0)]))]
    );
}

#[test]
fn first_connect_on_empty_store_gets_empty_full() {
    let hub = Hub::new();
    let channel = RecordingChannel::new();
    hub.connect(channel.clone());
    assert_eq!(channel.frames(), vec![r#"{"type":"full","data":{}}"#.to_string()]);
}

#[test]
fn changes_before_connect_are_not_replayed() {
    let hub = Hub::new();
    hub.publish(snap(&[("A", 1.0)]));
    hub.publish(snap(&[("A", 2.0)]));
    hub.publish(snap(&[("A", 3.0), ("B", 1.0)]));

    let channel = RecordingChannel::new();
    hub.connect(channel.clone());

    assert_eq!(channel.updates(), 0);
    assert_eq!(channel.mirror(), snap(&[("A", 3.0), ("B", 1.0)]));
}

#[test]
fn broadcast_carries_only_the_changes() {
    let hub = Hub::new();
    hub.publish(snap(&[("A", 1.0), ("B", 2.0)]));
    let channel = RecordingChannel::new();
    hub.connect(channel.clone());

    let changes = hub.publish(snap(&[("A", 1.0), ("B", 3.0), ("C", 4.0)]));

    assert_eq!(changes.len(), 2);
    let messages = channel.messages();
    assert_eq!(messages.len(), 2);
    match &messages[1] {
        WireMessage::Update(update) => {
            assert_eq!(update, &changes);
            assert_eq!(update.get("A"), None);
            assert_eq!(update.get("B"), Some(Change::Changed(3.0)));
            assert_eq!(update.get("C"), Some(Change::Changed(4.0)));
        }
        other => panic!("expected update, got {:?}", other),
    }
}

#[test]
fn emptied_source_broadcasts_null() {
    let hub = Hub::new();
    hub.publish(snap(&[("A", 1.0)]));
    let channel = RecordingChannel::new();
    hub.connect(channel.clone());

    hub.publish(snap(&[]));

    assert_eq!(channel.frames()[1], r#"{"type":"update","data":{"A":null}}"#);
    assert!(hub.current().is_empty());
}

#[test]
fn identical_snapshot_sends_nothing() {
    let hub = Hub::new();
    hub.publish(snap(&[("A", 1.0)]));
    let a = RecordingChannel::new();
    let b = RecordingChannel::new();
    hub.connect(a.clone());
    hub.connect(b.clone());

    let changes = hub.publish(snap(&[("A", 1.0)]));

    assert!(changes.is_empty());
    assert_eq!(a.frames().len(), 1);
    assert_eq!(b.frames().len(), 1);
}

#[test]
fn closed_and_busy_channels_do_not_stop_the_fanout() {
    let hub = Hub::new();
    let closed = RecordingChannel::new();
    let busy = RecordingChannel::new();
    let healthy = RecordingChannel::new();
    hub.connect(closed.clone());
    hub.connect(busy.clone());
    hub.connect(healthy.clone());
    closed.close();
    busy.set_not_ready(true);

    hub.publish(snap(&[("A", 1.0)]));

    assert_eq!(closed.frames().len(), 1);
    assert_eq!(busy.frames().len(), 1);
    assert_eq!(healthy.updates(), 1);
    // Closed channels stay registered until the transport reports the close.
    assert_eq!(hub.subscriber_count(), 3);

    busy.set_not_ready(false);
    hub.publish(snap(&[("A", 2.0)]));
    assert_eq!(busy.updates(), 1);
    assert_eq!(healthy.updates(), 2);
}

#[test]
fn disconnected_subscriber_receives_nothing_more() {
    let hub = Hub::new();
    let channel = RecordingChannel::new();
    let subscriber = hub.connect(channel.clone());

    assert!(hub.disconnect(subscriber.id()));
    assert!(!hub.disconnect(subscriber.id()));
    hub.publish(snap(&[("A", 1.0)]));

    assert_eq!(channel.frames().len(), 1);
    assert_eq!(hub.subscriber_count(), 0);
}

/// Channel that disconnects another subscriber from inside the fan-out.
struct DisconnectingChannel {
    hub: Arc<Hub>,
    victim: AtomicU64,
    inner: Arc<RecordingChannel>,
}

impl Channel for DisconnectingChannel {
    fn is_open(&self) -> bool {
        true
    }

    fn send(&self, frame: Arc<str>) -> Result<(), ChannelError> {
        let victim = self.victim.load(Ordering::SeqCst);
        if victim != 0 {
            self.hub.disconnect(victim);
        }
        self.inner.send(frame)
    }
}

#[test]
fn removal_during_broadcast_is_tolerated() {
    let hub = Arc::new(Hub::new());
    let remover_log = RecordingChannel::new();
    let remover = Arc::new(DisconnectingChannel {
        hub: Arc::clone(&hub),
        victim: AtomicU64::new(0),
        inner: remover_log.clone(),
    });
    hub.connect(remover.clone());

    let victim_log = RecordingChannel::new();
    let victim = hub.connect(victim_log.clone());
    remover.victim.store(victim.id(), Ordering::SeqCst);

    hub.publish(snap(&[("A", 1.0)]));
    assert!(!hub.is_connected(victim.id()));
    // Whether the victim got this one update depends on fan-out order.
    let after_removal = victim_log.frames().len();
    assert!(victim_log.updates() <= 1);

    hub.publish(snap(&[("A", 2.0)]));
    hub.publish(snap(&[("A", 3.0), ("B", 1.0)]));

    assert_eq!(victim_log.frames().len(), after_removal);
    assert_eq!(remover_log.updates(), 3);
}

#[test]
fn concurrent_connects_see_a_consistent_sequence() {
    let hub = Arc::new(Hub::new());

    let writer = {
        let hub = Arc::clone(&hub);
        thread::spawn(move || {
            for i in 0..200 {
                let value = i as f64;
                let mut items = vec![("A", value)];
                if i % 3 == 0 {
                    items.push(("B", value * 2.0));
                }
                hub.publish(snap(&items));
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let hub = Arc::clone(&hub);
        readers.push(thread::spawn(move || {
            let mut kept = Vec::new();
            for round in 0..50 {
                let channel = RecordingChannel::new();
                let subscriber = hub.connect(channel.clone());
                if round % 2 == 0 {
                    hub.disconnect(subscriber.id());
                } else {
                    kept.push(channel);
                }
            }
            kept
        }));
    }

    writer.join().unwrap();
    let final_snapshot = hub.current();
    for reader in readers {
        for channel in reader.join().unwrap() {
            let messages = channel.messages();
            assert!(matches!(messages.first(), Some(WireMessage::Full(_))));
            assert_eq!(
                messages.iter().filter(|m| matches!(m, WireMessage::Full(_))).count(),
                1
            );
            assert_eq!(channel.mirror(), *final_snapshot);
        }
    }
}
