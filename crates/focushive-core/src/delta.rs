//! Delta events: every authoritative state change the presence, timer, and
//! partnership cores make is published as one of these, carrying the topic
//! it routes on and a per-topic sequence number subscribers use to detect
//! gaps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kernel::Identifier;

/// Routing address for the broadcast bus: `hive:{id}`, `user:{id}`, or
/// `partnership:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Hive(Identifier),
    User(Identifier),
    Partnership(Identifier),
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::Hive(id) => write!(f, "hive:{id}"),
            Topic::User(id) => write!(f, "user:{id}"),
            Topic::Partnership(id) => write!(f, "partnership:{id}"),
        }
    }
}

/// Presence-delta kinds, emitted by the presence core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceDeltaKind {
    Join,
    DeviceAdded,
    DeviceRemoved,
    Status,
    Leave,
}

/// Timer-delta kinds, emitted by the timer core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerDeltaKind {
    Started,
    Paused,
    Resumed,
    Completed,
    Expired,
    Cancelled,
}

/// Partnership-delta kinds, emitted by the partnership engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnershipDeltaKind {
    Requested,
    Accepted,
    Paused,
    Resumed,
    Ended,
    CheckinRecorded,
    MilestoneCompleted,
}

/// Goal-delta kinds, emitted by the partnership engine alongside
/// `PartnershipDelta` for goal-scoped changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalDeltaKind {
    Created,
    ProgressUpdated,
    Completed,
    Cancelled,
}

/// Tagged union over every delta kind the system produces. Subscribers must
/// tolerate out-of-order arrival across topics and gaps within a topic by
/// resynchronizing against authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeltaEvent {
    PresenceDelta {
        kind: PresenceDeltaKind,
        user_id: Identifier,
        hive_id: Identifier,
        payload: serde_json::Value,
    },
    TimerDelta {
        kind: TimerDeltaKind,
        session_id: Identifier,
        payload: serde_json::Value,
    },
    PartnershipDelta {
        kind: PartnershipDeltaKind,
        partnership_id: Identifier,
        payload: serde_json::Value,
    },
    GoalDelta {
        kind: GoalDeltaKind,
        goal_id: Identifier,
        partnership_id: Identifier,
        payload: serde_json::Value,
    },
}

/// The envelope actually placed on the wire: `{topic, sequenceNo, kind,
/// payload, producedAt}` per the external-interfaces contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub topic: Topic,
    pub sequence_no: u64,
    pub event: DeltaEvent,
    pub produced_at: DateTime<Utc>,
}

/// Narrow publishing interface every core depends on instead of the
/// concrete broadcast bus, so each can be faked in tests.
#[async_trait::async_trait]
pub trait DeltaPublisher: Send + Sync {
    async fn publish(&self, topic: Topic, event: DeltaEvent);
}

/// A publisher that discards everything -- used where a collaborator has
/// not wired a real bus yet (e.g. standalone CLI invocations).
#[derive(Debug, Default)]
pub struct NullPublisher;

#[async_trait::async_trait]
impl DeltaPublisher for NullPublisher {
    async fn publish(&self, _topic: Topic, _event: DeltaEvent) {}
}
