use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use super::clock::Clock;
use std::sync::Arc;

/// Errors raised by a [`KeyValueStore`] implementation.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("version mismatch: expected {expected:?}, found {found:?}")]
    VersionConflict {
        expected: Option<u64>,
        found: Option<u64>,
    },
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

/// A value read back from the store, carrying its CAS version.
#[derive(Debug, Clone)]
pub struct VersionedValue {
    pub value: Vec<u8>,
    pub version: u64,
}

/// The distributed key-value store abstraction used by presence, revocation,
/// rate-limit counters, and JWKS caching. Mutations use atomic
/// set-if-version (CAS) or TTL-scoped writes; no component talks to a
/// concrete store client directly.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, KvError>;

    /// Compare-and-swap write. `expected_version` must match the stored
    /// version (or be `None` for a fresh key); on success returns the new
    /// version. A mismatch returns `KvError::VersionConflict`.
    async fn set_if_version(
        &self,
        key: &str,
        expected_version: Option<u64>,
        value: Vec<u8>,
    ) -> Result<u64, KvError>;

    /// Write a value with an absolute expiry; the store auto-removes the
    /// entry after `ttl` without caller intervention (used by the
    /// revocation set and the JWKS cache).
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

struct Entry {
    value: Vec<u8>,
    version: u64,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Single-process reference implementation sufficient for tests and the CLI.
/// A real deployment substitutes a Redis-backed (or similar) implementation
/// behind the same trait.
pub struct InMemoryKvStore {
    clock: Arc<dyn Clock>,
    entries: DashMap<String, Entry>,
}

impl InMemoryKvStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: DashMap::new(),
        }
    }

    fn is_live(&self, entry: &Entry) -> bool {
        match entry.expires_at {
            Some(at) => at > self.clock.now(),
            None => true,
        }
    }

    /// Test/diagnostic helper: count of live entries, evicting expired ones.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| self.is_live(e.value()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, KvError> {
        match self.entries.get(key) {
            Some(entry) if self.is_live(&entry) => Ok(Some(VersionedValue {
                value: entry.value.clone(),
                version: entry.version,
            })),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_if_version(
        &self,
        key: &str,
        expected_version: Option<u64>,
        value: Vec<u8>,
    ) -> Result<u64, KvError> {
        let mut entry = self.entries.entry(key.to_string());
        use dashmap::mapref::entry::Entry as DashEntry;
        match entry {
            DashEntry::Occupied(ref mut occ) if self.is_live(occ.get()) => {
                let found = occ.get().version;
                if expected_version != Some(found) {
                    return Err(KvError::VersionConflict {
                        expected: expected_version,
                        found: Some(found),
                    });
                }
                let new_version = found + 1;
                occ.insert(Entry {
                    value,
                    version: new_version,
                    expires_at: None,
                });
                Ok(new_version)
            }
            DashEntry::Occupied(mut occ) => {
                if expected_version.is_some() {
                    return Err(KvError::VersionConflict {
                        expected: expected_version,
                        found: None,
                    });
                }
                occ.insert(Entry {
                    value,
                    version: 1,
                    expires_at: None,
                });
                Ok(1)
            }
            DashEntry::Vacant(vac) => {
                if expected_version.is_some() {
                    return Err(KvError::VersionConflict {
                        expected: expected_version,
                        found: None,
                    });
                }
                vac.insert(Entry {
                    value,
                    version: 1,
                    expires_at: None,
                });
                Ok(1)
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
        let expires_at = self.clock.now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| KvError::Unavailable(e.to_string()))?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                version: 1,
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Repository-style boundary for the relational store (partnerships, goals,
/// milestones, check-ins, timer sessions, templates, hives, memberships).
/// Methods take and return plain records; no lazy-loaded associations.
/// Concrete persistence is a collaborator concern -- this trait only fixes
/// the shape each core depends on.
#[async_trait]
pub trait TxnalStore<K, V>: Send + Sync {
    async fn find(&self, key: &K) -> Result<Option<V>, KvError>;
    /// Like [`TxnalStore::find`], but also returns the row's current
    /// optimistic version so the caller can round-trip it through
    /// [`TxnalStore::update_if_version`].
    async fn find_versioned(&self, key: &K) -> Result<Option<(u64, V)>, KvError>;
    async fn insert(&self, key: K, value: V) -> Result<(), KvError>;
    async fn update_if_version(&self, key: &K, expected_version: u64, value: V) -> Result<u64, KvError>;
    async fn remove(&self, key: &K) -> Result<(), KvError>;
    async fn scan(&self) -> Result<Vec<V>, KvError>;
}

/// In-memory reference implementation of [`TxnalStore`], keyed by an
/// `Identifier`-shaped key with a `version` the caller tracks itself
/// (records opt in by storing their own version field inside `V`).
pub struct InMemoryTxnalStore<K, V> {
    rows: parking_lot::RwLock<HashMap<K, (u64, V)>>,
}

impl<K, V> Default for InMemoryTxnalStore<K, V>
where
    K: std::hash::Hash + Eq,
{
    fn default() -> Self {
        Self {
            rows: parking_lot::RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<K, V> TxnalStore<K, V> for InMemoryTxnalStore<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn find(&self, key: &K) -> Result<Option<V>, KvError> {
        Ok(self.rows.read().get(key).map(|(_, v)| v.clone()))
    }

    async fn insert(&self, key: K, value: V) -> Result<(), KvError> {
        self.rows.write().insert(key, (1, value));
        Ok(())
    }

    async fn update_if_version(&self, key: &K, expected_version: u64, value: V) -> Result<u64, KvError> {
        let mut rows = self.rows.write();
        match rows.get(key) {
            Some((version, _)) if *version == expected_version => {
                let new_version = expected_version + 1;
                rows.insert(key.clone(), (new_version, value));
                Ok(new_version)
            }
            Some((version, _)) => Err(KvError::VersionConflict {
                expected: Some(expected_version),
                found: Some(*version),
            }),
            None => Err(KvError::VersionConflict {
                expected: Some(expected_version),
                found: None,
            }),
        }
    }

    async fn remove(&self, key: &K) -> Result<(), KvError> {
        self.rows.write().remove(key);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<V>, KvError> {
        Ok(self.rows.read().values().map(|(_, v)| v.clone()).collect())
    }
}
