//! Real-time presence core: connections, devices, and per-hive rosters,
//! with heartbeat-driven liveness and bounded-latency broadcast.

pub mod core;
pub mod types;

pub use self::core::PresenceCore;
pub use types::{DeviceSession, PresenceRecord, PresenceStatus, RosterEntry};
