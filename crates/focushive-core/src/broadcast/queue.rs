use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::delta::Delta;

/// One entry in a subscriber's queue: either a delivered delta or a marker
/// telling the subscriber a gap occurred and it must resync against
/// authoritative state.
#[derive(Debug, Clone)]
pub enum BusMessage {
    Delta(Delta),
    ResyncRequired,
}

/// Single-writer-per-subscriber bounded queue. Overflow drops the oldest
/// entry and appends a `RESYNC_REQUIRED` marker rather than blocking the
/// publisher, matching the system's bounded-queue backpressure policy.
pub struct SubscriberQueue {
    queue: Mutex<VecDeque<BusMessage>>,
    capacity: usize,
    notify: Notify,
    last_sequence: AtomicU64,
}

impl SubscriberQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            notify: Notify::new(),
            last_sequence: AtomicU64::new(0),
        }
    }

    /// Enqueues `delta`, dropping the oldest entry and marking
    /// `RESYNC_REQUIRED` if the queue is already at capacity. Deltas whose
    /// `sequence_no` does not exceed the highest one already seen are
    /// suppressed as cluster-replay duplicates.
    pub fn push(&self, delta: Delta) {
        let mut guard = self.queue.lock();
        let last = self.last_sequence.load(Ordering::Acquire);
        if delta.sequence_no <= last && last != 0 {
            return;
        }
        self.last_sequence.store(delta.sequence_no, Ordering::Release);

        if guard.len() >= self.capacity {
            guard.pop_front();
            if !matches!(guard.back(), Some(BusMessage::ResyncRequired)) {
                if guard.len() >= self.capacity {
                    guard.pop_front();
                }
                guard.push_back(BusMessage::ResyncRequired);
            }
        }
        guard.push_back(BusMessage::Delta(delta));
        drop(guard);
        self.notify.notify_one();
    }

    /// Drains everything currently queued without waiting.
    pub fn drain(&self) -> Vec<BusMessage> {
        self.queue.lock().drain(..).collect()
    }

    /// Waits for at least one message, then drains everything queued.
    pub async fn recv_batch(&self) -> Vec<BusMessage> {
        loop {
            let notified = self.notify.notified();
            {
                let mut guard = self.queue.lock();
                if !guard.is_empty() {
                    return guard.drain(..).collect();
                }
            }
            notified.await;
            let drained = self.drain();
            if !drained.is_empty() {
                return drained;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{DeltaEvent, PresenceDeltaKind, Topic};
    use crate::kernel::Identifier;

    fn sample_delta(seq: u64) -> Delta {
        Delta {
            topic: Topic::Hive(Identifier::new()),
            sequence_no: seq,
            event: DeltaEvent::PresenceDelta {
                kind: PresenceDeltaKind::Join,
                user_id: Identifier::new(),
                hive_id: Identifier::new(),
                payload: serde_json::json!({}),
            },
            produced_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn overflow_drops_oldest_and_marks_resync_required() {
        let queue = SubscriberQueue::new(2);
        queue.push(sample_delta(1));
        queue.push(sample_delta(2));
        queue.push(sample_delta(3));

        let drained = queue.drain();
        assert!(matches!(drained[0], BusMessage::ResyncRequired));
        assert!(matches!(drained.last().unwrap(), BusMessage::Delta(d) if d.sequence_no == 3));
    }

    #[test]
    fn duplicate_sequence_numbers_are_suppressed() {
        let queue = SubscriberQueue::new(8);
        queue.push(sample_delta(1));
        queue.push(sample_delta(1));
        queue.push(sample_delta(2));
        assert_eq!(queue.len(), 2);
    }
}
