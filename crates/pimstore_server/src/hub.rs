//! Process-wide fan-out of committed change notifications.
//!
//! Committed transactions [`publish`](NotificationHub::publish) their
//! collected notifications into one pending batch. Each notification is
//! folded into that batch with the same compression rules the per
//! transaction [`Collector`](pimstore_protocol::Collector) applies, so a
//! batch never carries redundant or contradictory records for one entity,
//! even when they came from separate transactions. A periodic
//! [`flush`](NotificationHub::flush) hands a copy of that batch to every
//! subscription and clears it, so subscribers see at most one batch per
//! flush interval no matter how many transactions committed in between.
//!
//! Pending notifications and subscriptions share a single lock. Sinks are
//! called while it is held and must not block.

use parking_lot::Mutex;
use pimstore_protocol::{append_and_compress, ChangeNotification};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A subscription could not take a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The receiving side is gone.
    #[error("channel closed")]
    Closed,

    /// The transport refused the batch.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Receives notification batches for one subscriber.
pub trait NotificationSink: Send {
    /// Delivers one batch. Must not block.
    fn deliver(&self, batch: &[ChangeNotification]) -> Result<(), DeliveryError>;
}

/// Sink backed by an in-process channel.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<Vec<ChangeNotification>>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its batches arrive on.
    pub fn new() -> (Self, Receiver<Vec<ChangeNotification>>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn deliver(&self, batch: &[ChangeNotification]) -> Result<(), DeliveryError> {
        self.sender
            .send(batch.to_vec())
            .map_err(|_| DeliveryError::Closed)
    }
}

#[derive(Default)]
struct HubState {
    pending: Vec<ChangeNotification>,
    subscriptions: BTreeMap<String, Box<dyn NotificationSink>>,
}

/// Batches notifications and pushes them to subscribers.
///
/// Construct one per process and share it behind an [`Arc`].
#[derive(Default)]
pub struct NotificationHub {
    state: Mutex<HubState>,
}

impl NotificationHub {
    /// Creates a hub with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the notifications of one committed transaction into the
    /// pending batch.
    pub fn publish(&self, notifications: Vec<ChangeNotification>) {
        if notifications.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        let mut appended = 0;
        for notification in notifications {
            if append_and_compress(&mut state.pending, notification) {
                appended += 1;
            }
        }
        debug!(appended, pending = state.pending.len(), "notifications queued");
    }

    /// Subscribes through an in-process channel.
    ///
    /// An existing subscription with the same identifier is replaced.
    pub fn subscribe(&self, identifier: impl Into<String>) -> Receiver<Vec<ChangeNotification>> {
        let (sink, receiver) = ChannelSink::new();
        self.subscribe_sink(identifier, Box::new(sink));
        receiver
    }

    /// Subscribes an arbitrary sink, replacing any with the same identifier.
    pub fn subscribe_sink(&self, identifier: impl Into<String>, sink: Box<dyn NotificationSink>) {
        let identifier = identifier.into();
        debug!(%identifier, "subscriber added");
        self.state.lock().subscriptions.insert(identifier, sink);
    }

    /// Removes a subscription. Returns false if it did not exist.
    pub fn unsubscribe(&self, identifier: &str) -> bool {
        self.state.lock().subscriptions.remove(identifier).is_some()
    }

    /// Delivers the pending batch to every subscription and clears it.
    ///
    /// Subscriptions whose sink fails are dropped. Returns the number of
    /// notifications flushed.
    pub fn flush(&self) -> usize {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return 0;
        }
        let batch = std::mem::take(&mut state.pending);
        state
            .subscriptions
            .retain(|identifier, sink| match sink.deliver(&batch) {
                Ok(()) => true,
                Err(e) => {
                    warn!(%identifier, error = %e, "dropping subscriber");
                    false
                }
            });
        debug!(
            notifications = batch.len(),
            subscribers = state.subscriptions.len(),
            "batch flushed"
        );
        batch.len()
    }

    /// Number of notifications awaiting the next flush.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Flushes every `interval` on the current tokio runtime.
    ///
    /// Abort the returned handle to stop the loop.
    pub fn spawn_flush_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.flush();
            }
        })
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NotificationHub")
            .field("pending", &state.pending.len())
            .field("subscribers", &state.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pimstore_protocol::{EntityKind, Operation};
    use std::thread;

    fn modify(id: i64) -> ChangeNotification {
        ChangeNotification::new(EntityKind::Item, Operation::Modify, id).with_parts(["FLAGS"])
    }

    struct Failing;

    impl NotificationSink for Failing {
        fn deliver(&self, _: &[ChangeNotification]) -> Result<(), DeliveryError> {
            Err(DeliveryError::Failed("broken pipe".into()))
        }
    }

    #[test]
    fn flush_delivers_snapshot_to_all() {
        let hub = NotificationHub::new();
        let a = hub.subscribe("a");
        let b = hub.subscribe("b");
        hub.publish(vec![modify(1), modify(2)]);

        assert_eq!(hub.flush(), 2);
        let batch_a = a.try_recv().unwrap();
        let batch_b = b.try_recv().unwrap();
        assert_eq!(batch_a, batch_b);
        assert_eq!(batch_a.len(), 2);
        assert_eq!(hub.pending_len(), 0);
    }

    #[test]
    fn empty_flush_sends_nothing() {
        let hub = NotificationHub::new();
        let rx = hub.subscribe("a");
        assert_eq!(hub.flush(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn late_subscriber_gets_pending_batch() {
        let hub = NotificationHub::new();
        hub.publish(vec![modify(1)]);
        let rx = hub.subscribe("late");
        hub.flush();
        assert_eq!(rx.try_recv().unwrap().len(), 1);
    }

    #[test]
    fn closed_channel_drops_only_that_subscriber() {
        let hub = NotificationHub::new();
        let alive = hub.subscribe("alive");
        drop(hub.subscribe("gone"));
        hub.subscribe_sink("broken", Box::new(Failing));
        assert_eq!(hub.subscriber_count(), 3);

        hub.publish(vec![modify(1)]);
        hub.flush();
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(alive.try_recv().unwrap().len(), 1);
    }

    #[test]
    fn resubscribe_replaces() {
        let hub = NotificationHub::new();
        let old = hub.subscribe("x");
        let new = hub.subscribe("x");
        assert_eq!(hub.subscriber_count(), 1);
        hub.publish(vec![modify(1)]);
        hub.flush();
        assert!(old.try_recv().is_err());
        assert!(new.try_recv().is_ok());
        assert!(hub.unsubscribe("x"));
        assert!(!hub.unsubscribe("x"));
    }

    #[test]
    fn concurrent_publishers_lose_nothing() {
        let hub = Arc::new(NotificationHub::new());
        let rx = hub.subscribe("s");
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let hub = Arc::clone(&hub);
                thread::spawn(move || {
                    for i in 0..50 {
                        hub.publish(vec![modify(t * 100 + i)]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(hub.flush(), 200);
        assert_eq!(rx.try_recv().unwrap().len(), 200);
    }

    #[test]
    fn publishes_between_flushes_are_compressed() {
        let hub = NotificationHub::new();
        let rx = hub.subscribe("s");
        let item = |op| {
            ChangeNotification::new(EntityKind::Item, op, 1)
                .with_session("s1")
                .with_resource("res1")
                .with_parent_collection(10)
        };
        hub.publish(vec![item(Operation::Modify).with_parts(["FLAGS"])]);
        hub.publish(vec![item(Operation::Modify).with_parts(["REMOTEID"])]);
        assert_eq!(hub.pending_len(), 1);
        hub.publish(vec![item(Operation::Remove)]);

        assert_eq!(hub.flush(), 1);
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch[0].operation(), Operation::Remove);

        // Nothing carries over into the next batch.
        hub.publish(vec![item(Operation::Add)]);
        assert_eq!(hub.flush(), 1);
        assert_eq!(rx.try_recv().unwrap()[0].operation(), Operation::Add);
    }

    #[tokio::test]
    async fn flush_loop_delivers() {
        let hub = Arc::new(NotificationHub::new());
        let rx = hub.subscribe("s");
        let handle = Arc::clone(&hub).spawn_flush_loop(Duration::from_millis(10));
        hub.publish(vec![modify(7)]);

        let batch = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch[0].id(), 7);
        handle.abort();
    }
}
