//! Presence core: tracks connections, devices, and per-hive rosters, all
//! backed by the distributed key-value store so multiple backend
//! instances converge on the same state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, info};

use crate::config::PresenceConfig;
use crate::delta::{DeltaEvent, DeltaPublisher, PresenceDeltaKind, Topic};
use crate::error::{CoreError, NotFoundError};
use crate::kernel::{Clock, Identifier, KeyValueStore};

use super::types::{DeviceSession, PresenceRecord, PresenceStatus, RosterEntry};

fn presence_key(hive_id: Identifier, user_id: Identifier) -> String {
    format!("presence:{hive_id}:{user_id}")
}

fn device_key(connection_id: &str) -> String {
    format!("device:{connection_id}")
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct DeviceIndexEntry {
    user_id: Identifier,
    hive_id: Identifier,
}

/// Owns presence state for the process; no ambient singleton. Constructed
/// once and shared (via `Arc`) across request-handling tasks.
pub struct PresenceCore {
    config: PresenceConfig,
    store: Arc<dyn KeyValueStore>,
    publisher: Arc<dyn DeltaPublisher>,
    clock: Arc<dyn Clock>,
    hive_sequence: DashMap<Identifier, AtomicU64>,
}

impl PresenceCore {
    pub fn new(
        config: PresenceConfig,
        store: Arc<dyn KeyValueStore>,
        publisher: Arc<dyn DeltaPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            publisher,
            clock,
            hive_sequence: DashMap::new(),
        }
    }

    fn next_sequence(&self, hive_id: Identifier) -> u64 {
        self.hive_sequence
            .entry(hive_id)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    async fn read_record(&self, hive_id: Identifier, user_id: Identifier) -> Result<Option<(PresenceRecord, Option<u64>)>, CoreError> {
        match self.store.get(&presence_key(hive_id, user_id)).await? {
            Some(versioned) => {
                let record: PresenceRecord = serde_json::from_slice(&versioned.value)?;
                Ok(Some((record, Some(versioned.version))))
            }
            None => Ok(None),
        }
    }

    /// Apply `mutate` to the record for `(user_id, hive_id)` (creating it
    /// via `PresenceRecord::new` if absent) under optimistic-CAS retry.
    async fn mutate_record<F>(&self, hive_id: Identifier, user_id: Identifier, mut mutate: F) -> Result<PresenceRecord, CoreError>
    where
        F: FnMut(&mut PresenceRecord),
    {
        const MAX_ATTEMPTS: u32 = 8;
        for _ in 0..MAX_ATTEMPTS {
            let (mut record, version) = match self.read_record(hive_id, user_id).await? {
                Some((record, version)) => (record, version),
                None => (PresenceRecord::new(user_id, hive_id, self.clock.now()), None),
            };

            mutate(&mut record);

            let payload = serde_json::to_vec(&record)?;
            match self
                .store
                .set_if_version(&presence_key(hive_id, user_id), version, payload)
                .await
            {
                Ok(_) => return Ok(record),
                Err(crate::kernel::KvError::VersionConflict { .. }) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(CoreError::Fatal(
            "presence record contention exceeded retry budget".to_string(),
        ))
    }

    async fn publish(&self, hive_id: Identifier, user_id: Identifier, kind: PresenceDeltaKind) {
        let sequence_no = self.next_sequence(hive_id);
        self.publisher
            .publish(
                Topic::Hive(hive_id),
                DeltaEvent::PresenceDelta {
                    kind,
                    user_id,
                    hive_id,
                    payload: json!({ "sequenceNo": sequence_no }),
                },
            )
            .await;
    }

    /// Upsert the presence record, add the device, set status ONLINE, and
    /// emit `JOIN` (first device for this user in this hive) or
    /// `DEVICE_ADDED` (an additional device).
    pub async fn on_connect(
        &self,
        user_id: Identifier,
        hive_id: Identifier,
        device_id: String,
        connection_id: String,
        client_kind: String,
    ) -> Result<PresenceRecord, CoreError> {
        let now = self.clock.now();
        let mut was_first_device = false;

        let record = self
            .mutate_record(hive_id, user_id, |record| {
                was_first_device = record.devices.is_empty();
                record.devices.retain(|d| d.connection_id != connection_id);
                record.devices.push(DeviceSession {
                    device_id: device_id.clone(),
                    connection_id: connection_id.clone(),
                    connected_at: now,
                    last_heartbeat: now,
                    client_kind: client_kind.clone(),
                });
                record.status = PresenceStatus::Online;
                record.last_heartbeat = now;
                record.pending_leave_since = None;
            })
            .await?;

        self.store
            .set_with_ttl(
                &device_key(&connection_id),
                serde_json::to_vec(&DeviceIndexEntry { user_id, hive_id })?,
                self.config.retention,
            )
            .await?;

        let kind = if was_first_device {
            PresenceDeltaKind::Join
        } else {
            PresenceDeltaKind::DeviceAdded
        };
        info!(%user_id, %hive_id, ?kind, "presence connect");
        self.publish(hive_id, user_id, kind).await;

        Ok(record)
    }

    /// Refresh `lastHeartbeat` on the matching device and its parent
    /// record. No delta is emitted.
    pub async fn on_heartbeat(&self, connection_id: &str) -> Result<(), CoreError> {
        let index = match self.store.get(&device_key(connection_id)).await? {
            Some(v) => serde_json::from_slice::<DeviceIndexEntry>(&v.value)?,
            None => return Ok(()),
        };

        let now = self.clock.now();
        self.mutate_record(index.hive_id, index.user_id, |record| {
            record.last_heartbeat = now;
            if let Some(device) = record.devices.iter_mut().find(|d| d.connection_id == connection_id) {
                device.last_heartbeat = now;
            }
        })
        .await?;

        Ok(())
    }

    /// Transition status if permitted; emits `STATUS`.
    pub async fn on_status_change(
        &self,
        user_id: Identifier,
        hive_id: Identifier,
        new_status: PresenceStatus,
    ) -> Result<PresenceRecord, CoreError> {
        if new_status == PresenceStatus::Offline {
            return Err(CoreError::Validation(crate::error::ValidationFailure::InvariantViolated(
                "status can only transition to OFFLINE via disconnect or sweep".to_string(),
            )));
        }

        let record = self
            .mutate_record(hive_id, user_id, |record| {
                if record.status.can_transition_to(new_status) {
                    record.status = new_status;
                }
            })
            .await?;

        if record.status != new_status {
            return Err(CoreError::Validation(crate::error::ValidationFailure::InvariantViolated(
                format!("cannot transition from {:?} to {:?}", record.status, new_status),
            )));
        }

        self.publish(hive_id, user_id, PresenceDeltaKind::Status).await;
        Ok(record)
    }

    /// Remove the device; if no devices remain, start the grace-period
    /// countdown rather than immediately marking OFFLINE.
    pub async fn on_disconnect(&self, connection_id: &str) -> Result<(), CoreError> {
        let index = match self.store.get(&device_key(connection_id)).await? {
            Some(v) => serde_json::from_slice::<DeviceIndexEntry>(&v.value)?,
            None => return Ok(()),
        };
        self.store.delete(&device_key(connection_id)).await?;

        let now = self.clock.now();
        let mut became_empty = false;
        self.mutate_record(index.hive_id, index.user_id, |record| {
            record.devices.retain(|d| d.connection_id != connection_id);
            if record.devices.is_empty() {
                record.pending_leave_since = Some(now);
                became_empty = true;
            }
        })
        .await?;

        if became_empty {
            debug!(user_id = %index.user_id, hive_id = %index.hive_id, "device removed, last device -- grace period begins");
        } else {
            self.publish(index.hive_id, index.user_id, PresenceDeltaKind::DeviceRemoved)
                .await;
        }

        Ok(())
    }

    /// Called by a scheduled grace-period check (or directly by tests):
    /// if the user has not reconnected, mark OFFLINE and emit `LEAVE`.
    pub async fn finalize_grace_period(&self, user_id: Identifier, hive_id: Identifier) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut left = false;
        self.mutate_record(hive_id, user_id, |record| {
            if record.devices.is_empty() {
                if let Some(since) = record.pending_leave_since {
                    if now - since >= chrono::Duration::from_std(self.config.grace_period).unwrap_or_default() {
                        record.status = PresenceStatus::Offline;
                        left = true;
                    }
                }
            }
        })
        .await?;

        if left {
            self.publish(hive_id, user_id, PresenceDeltaKind::Leave).await;
        }
        Ok(())
    }

    /// Scheduled every `PRESENCE_STALE_SEC`-interval-adjacent tick: removes
    /// any device whose heartbeat is older than the stale threshold and
    /// follows the disconnect path for records left with no devices.
    pub async fn stale_sweep(&self, known: &[(Identifier, Identifier)]) -> Result<(), CoreError> {
        let now = self.clock.now();
        let stale_after = chrono::Duration::from_std(self.config.stale_after).unwrap_or_default();

        for &(hive_id, user_id) in known {
            let mut became_empty = false;
            let mut removed_connections = Vec::new();
            self.mutate_record(hive_id, user_id, |record| {
                let (keep, stale): (Vec<_>, Vec<_>) = record
                    .devices
                    .drain(..)
                    .partition(|d| now - d.last_heartbeat <= stale_after);
                removed_connections = stale.iter().map(|d| d.connection_id.clone()).collect();
                record.devices = keep;
                if record.devices.is_empty() && !removed_connections.is_empty() {
                    record.pending_leave_since.get_or_insert(now);
                    became_empty = true;
                }
            })
            .await?;

            for connection_id in &removed_connections {
                self.store.delete(&device_key(connection_id)).await?;
            }

            if !removed_connections.is_empty() && !became_empty {
                self.publish(hive_id, user_id, PresenceDeltaKind::DeviceRemoved).await;
            }
        }
        Ok(())
    }

    /// Scheduled alongside `stale_sweep` (coarser interval): destroys any
    /// OFFLINE presence record whose `lastHeartbeat` has not moved in
    /// `config.retention`, per the retention lifecycle -- a record is
    /// created on first connect and destroyed only after this bound, never
    /// eagerly on disconnect.
    pub async fn retention_sweep(&self, known: &[(Identifier, Identifier)]) -> Result<usize, CoreError> {
        let now = self.clock.now();
        let retention = chrono::Duration::from_std(self.config.retention).unwrap_or_default();
        let mut destroyed = 0;

        for &(hive_id, user_id) in known {
            let Some((record, _)) = self.read_record(hive_id, user_id).await? else {
                continue;
            };
            if record.status == PresenceStatus::Offline && now - record.last_heartbeat >= retention {
                self.store.delete(&presence_key(hive_id, user_id)).await?;
                destroyed += 1;
                debug!(%user_id, %hive_id, "presence record destroyed after retention period");
            }
        }
        Ok(destroyed)
    }

    /// Returns the current roster snapshot for a hive. Callers facing a
    /// `RESYNC_REQUIRED` marker on the broadcast bus call this to recover
    /// authoritative state.
    pub async fn get_hive_roster(&self, hive_id: Identifier, known_users: &[Identifier]) -> Result<Vec<RosterEntry>, CoreError> {
        let mut roster = Vec::new();
        for &user_id in known_users {
            if let Some((record, _)) = self.read_record(hive_id, user_id).await? {
                if record.status != PresenceStatus::Offline {
                    roster.push(RosterEntry {
                        user_id,
                        status: record.status,
                        device_count: record.devices.len(),
                    });
                }
            }
        }
        Ok(roster)
    }

    pub async fn get_record(&self, hive_id: Identifier, user_id: Identifier) -> Result<PresenceRecord, CoreError> {
        self.read_record(hive_id, user_id)
            .await?
            .map(|(record, _)| record)
            .ok_or_else(|| {
                CoreError::NotFound(NotFoundError::Entity {
                    entity: "presence".to_string(),
                    id: format!("{hive_id}:{user_id}"),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::NullPublisher;
    use crate::kernel::{FakeClock, InMemoryKvStore};

    fn core() -> (PresenceCore, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let store = Arc::new(InMemoryKvStore::new(clock.clone()));
        let core = PresenceCore::new(
            PresenceConfig {
                heartbeat_interval: std::time::Duration::from_secs(30),
                stale_after: std::time::Duration::from_secs(60),
                grace_period: std::time::Duration::from_secs(30),
                retention: std::time::Duration::from_secs(3600 * 24),
            },
            store,
            Arc::new(NullPublisher),
            clock.clone(),
        );
        (core, clock)
    }

    #[tokio::test]
    async fn multi_device_join_and_leave_sequence() {
        let (core, clock) = core();
        let user = Identifier::new();
        let hive = Identifier::new();

        let record = core
            .on_connect(user, hive, "d1".into(), "c1".into(), "desktop".into())
            .await
            .unwrap();
        assert_eq!(record.devices.len(), 1);
        assert_eq!(record.status, PresenceStatus::Online);

        let record = core
            .on_connect(user, hive, "d2".into(), "c2".into(), "mobile".into())
            .await
            .unwrap();
        assert_eq!(record.devices.len(), 2);

        core.on_disconnect("c2").await.unwrap();
        let record = core.get_record(hive, user).await.unwrap();
        assert_eq!(record.devices.len(), 1);

        core.on_disconnect("c1").await.unwrap();
        let record = core.get_record(hive, user).await.unwrap();
        assert!(record.devices.is_empty());
        assert_eq!(record.status, PresenceStatus::Online, "still within grace period");

        clock.advance(chrono::Duration::seconds(31));
        core.finalize_grace_period(user, hive).await.unwrap();
        let record = core.get_record(hive, user).await.unwrap();
        assert_eq!(record.status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn reconnect_within_grace_period_cancels_leave() {
        let (core, clock) = core();
        let user = Identifier::new();
        let hive = Identifier::new();

        core.on_connect(user, hive, "d1".into(), "c1".into(), "desktop".into())
            .await
            .unwrap();
        core.on_disconnect("c1").await.unwrap();
        clock.advance(chrono::Duration::seconds(10));
        core.on_connect(user, hive, "d1".into(), "c3".into(), "desktop".into())
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(31));
        core.finalize_grace_period(user, hive).await.unwrap();
        let record = core.get_record(hive, user).await.unwrap();
        assert_eq!(record.status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn heartbeat_exactly_at_stale_boundary_is_kept() {
        let (core, clock) = core();
        let user = Identifier::new();
        let hive = Identifier::new();
        core.on_connect(user, hive, "d1".into(), "c1".into(), "desktop".into())
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(60));
        core.stale_sweep(&[(hive, user)]).await.unwrap();
        let record = core.get_record(hive, user).await.unwrap();
        assert_eq!(record.devices.len(), 1, "60s exactly should still be accepted");

        clock.advance(chrono::Duration::milliseconds(1));
        core.stale_sweep(&[(hive, user)]).await.unwrap();
        let record = core.get_record(hive, user).await.unwrap();
        assert!(record.devices.is_empty(), "60s + epsilon should be stale");
    }

    #[tokio::test]
    async fn retention_sweep_destroys_offline_records_past_the_retention_window() {
        let (core, clock) = core();
        let user = Identifier::new();
        let hive = Identifier::new();
        core.on_connect(user, hive, "d1".into(), "c1".into(), "desktop".into())
            .await
            .unwrap();
        core.on_disconnect("c1").await.unwrap();
        clock.advance(chrono::Duration::seconds(31));
        core.finalize_grace_period(user, hive).await.unwrap();
        assert_eq!(core.get_record(hive, user).await.unwrap().status, PresenceStatus::Offline);

        let destroyed = core.retention_sweep(&[(hive, user)]).await.unwrap();
        assert_eq!(destroyed, 0, "still well within the retention window");

        clock.advance(chrono::Duration::hours(24));
        let destroyed = core.retention_sweep(&[(hive, user)]).await.unwrap();
        assert_eq!(destroyed, 1);
        assert!(core.get_record(hive, user).await.is_err(), "record should be gone");
    }

    #[tokio::test]
    async fn retention_sweep_leaves_online_records_alone() {
        let (core, clock) = core();
        let user = Identifier::new();
        let hive = Identifier::new();
        core.on_connect(user, hive, "d1".into(), "c1".into(), "desktop".into())
            .await
            .unwrap();

        clock.advance(chrono::Duration::hours(48));
        let destroyed = core.retention_sweep(&[(hive, user)]).await.unwrap();
        assert_eq!(destroyed, 0);
        assert!(core.get_record(hive, user).await.is_ok());
    }
}
