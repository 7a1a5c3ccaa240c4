use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kernel::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceStatus {
    Online,
    Away,
    Focusing,
    Offline,
}

impl PresenceStatus {
    /// ONLINE/AWAY/FOCUSING are mutually reachable; OFFLINE is reachable
    /// only via disconnect or the stale sweep.
    pub fn can_transition_to(self, next: PresenceStatus) -> bool {
        use PresenceStatus::*;
        match (self, next) {
            (Offline, Offline) => true,
            (_, Offline) => false,
            (a, b) if a == b => true,
            (Online | Away | Focusing, Online | Away | Focusing) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSession {
    pub device_id: String,
    pub connection_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub client_kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: Identifier,
    pub hive_id: Identifier,
    pub status: PresenceStatus,
    pub devices: Vec<DeviceSession>,
    pub last_heartbeat: DateTime<Utc>,
    pub current_session_id: Option<Identifier>,
    /// set when the last device disconnected; cleared on reconnect within
    /// the grace period.
    pub pending_leave_since: Option<DateTime<Utc>>,
}

impl PresenceRecord {
    pub fn new(user_id: Identifier, hive_id: Identifier, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            hive_id,
            status: PresenceStatus::Online,
            devices: Vec::new(),
            last_heartbeat: now,
            current_session_id: None,
            pending_leave_since: None,
        }
    }

    pub fn is_empty_of_devices(&self) -> bool {
        self.devices.is_empty()
    }
}

/// A point-in-time view of who is present in a hive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: Identifier,
    pub status: PresenceStatus,
    pub device_count: usize,
}
