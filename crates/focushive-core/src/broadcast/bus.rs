//! Broadcast bus: delivers deltas to subscribers filtered by topic
//! (`hive:{id}`, `user:{id}`, `partnership:{id}`) with per-subscriber
//! backpressure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::delta::{Delta, DeltaEvent, DeltaPublisher, Topic};
use crate::kernel::{Clock, Identifier};

use super::queue::{BusMessage, SubscriberQueue};

/// Fan-out to other nodes in a multi-instance deployment. A single-process
/// deployment uses [`NoCluster`]; a real deployment substitutes a
/// Redis/NATS-backed implementation behind this trait.
#[async_trait]
pub trait ClusterChannel: Send + Sync {
    async fn publish(&self, delta: &Delta);
}

#[derive(Debug, Default)]
pub struct NoCluster;

#[async_trait]
impl ClusterChannel for NoCluster {
    async fn publish(&self, _delta: &Delta) {}
}

/// A live subscription. Dropping or calling [`Subscription::cancel`]
/// de-registers the queue from its topic.
pub struct Subscription {
    id: Identifier,
    topic: Topic,
    queue: Arc<SubscriberQueue>,
    bus: Arc<BroadcastBusInner>,
}

impl Subscription {
    pub fn cancel(self) {
        self.bus.unsubscribe(&self.topic, self.id);
    }

    /// Waits for and returns the next batch of queued messages -- real
    /// deltas and/or `RESYNC_REQUIRED` markers, in arrival order.
    pub async fn recv_batch(&self) -> Vec<BusMessage> {
        self.queue.recv_batch().await
    }
}

struct BroadcastBusInner {
    default_capacity: usize,
    subscribers: DashMap<Topic, DashMap<Identifier, Arc<SubscriberQueue>>>,
}

impl BroadcastBusInner {
    fn unsubscribe(&self, topic: &Topic, id: Identifier) {
        if let Some(subs) = self.subscribers.get(topic) {
            subs.remove(&id);
        }
    }
}

/// Single-process broker with per-subscriber bounded queues (default 256).
/// `publish` additionally forwards to a [`ClusterChannel`] so other nodes'
/// local subscribers see the same delta.
pub struct BroadcastBus {
    inner: Arc<BroadcastBusInner>,
    clock: Arc<dyn Clock>,
    cluster: Arc<dyn ClusterChannel>,
    topic_sequence: DashMap<Topic, AtomicU64>,
}

impl BroadcastBus {
    pub fn new(default_capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self::with_cluster(default_capacity, clock, Arc::new(NoCluster))
    }

    pub fn with_cluster(default_capacity: usize, clock: Arc<dyn Clock>, cluster: Arc<dyn ClusterChannel>) -> Self {
        Self {
            inner: Arc::new(BroadcastBusInner {
                default_capacity,
                subscribers: DashMap::new(),
            }),
            clock,
            cluster,
            topic_sequence: DashMap::new(),
        }
    }

    fn next_sequence(&self, topic: &Topic) -> u64 {
        self.topic_sequence
            .entry(topic.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    /// Registers a new subscriber on `topic`, returning a handle to both
    /// receive from and cancel the subscription.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let id = Identifier::new();
        let queue = Arc::new(SubscriberQueue::new(self.inner.default_capacity));
        self.inner
            .subscribers
            .entry(topic.clone())
            .or_default()
            .insert(id, queue.clone());
        Subscription {
            id,
            topic,
            queue,
            bus: self.inner.clone(),
        }
    }

    /// Delivers `delta` (already enveloped, e.g. replayed from another
    /// node) straight to local subscribers without assigning a new
    /// sequence number.
    pub fn deliver(&self, delta: Delta) {
        if let Some(subs) = self.inner.subscribers.get(&delta.topic) {
            for entry in subs.iter() {
                entry.value().push(delta.clone());
            }
        }
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner
            .subscribers
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DeltaPublisher for BroadcastBus {
    async fn publish(&self, topic: Topic, event: DeltaEvent) {
        let sequence_no = self.next_sequence(&topic);
        let delta = Delta {
            topic: topic.clone(),
            sequence_no,
            event,
            produced_at: self.clock.now(),
        };
        self.deliver(delta.clone());
        self.cluster.publish(&delta).await;
    }
}
