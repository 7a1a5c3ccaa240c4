//! A narrow TTL cache with single-flight coalescing, used for both the
//! JWKS cache and the verdict cache. Simple enough to own directly rather
//! than pull in an external crate.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::kernel::Clock;

struct Entry<V> {
    value: V,
    expires_at: chrono::DateTime<chrono::Utc>,
}

pub struct Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    clock: Arc<dyn Clock>,
    entries: DashMap<K, Entry<V>>,
    locks: DashMap<K, Arc<AsyncMutex<()>>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > self.clock.now() => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        self.entries.insert(key, Entry { value, expires_at });
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Return the cached value for `key`, or compute it via `fetch` under a
    /// per-key lock so concurrent misses coalesce into a single fetch.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = fetch().await?;
        self.put(key, value.clone(), ttl);
        Ok(value)
    }

    /// Like [`Cache::get_or_fetch`], but `fetch` picks its own TTL per
    /// outcome (used for a positive/negative-TTL split).
    pub async fn get_or_fetch_with_ttl<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(V, Duration), E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let (value, ttl) = fetch().await?;
        self.put(key, value.clone(), ttl);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::FakeClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_fetch() {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let cache: Arc<Cache<String, u32>> = Arc::new(Cache::new(clock));
        let fetch_count = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let fetch_count = fetch_count.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("kid-1".to_string(), Duration::from_secs(60), || async {
                        fetch_count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok::<u32, ()>(42)
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 42);
        }
        assert_eq!(fetch_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_entries_are_treated_as_absent() {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let cache: Cache<&str, u32> = Cache::new(clock.clone());
        cache.put("k", 1, Duration::from_secs(10));
        clock.advance(chrono::Duration::seconds(11));
        assert_eq!(cache.get(&"k"), None);
    }
}
