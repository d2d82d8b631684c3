//! In-process cache store
//!
//! Used for local development without Redis and by tests. Expiry follows the
//! tokio clock, so paused-time tests can move past a TTL with
//! `tokio::time::advance`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::CacheStore;
use crate::error::{CacheError, CacheResult};
use crate::state::{ConnectionState, ConnectionTracker};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    tracker: ConnectionTracker,
}

impl MemoryStore {
    /// A store that is immediately `Ready`
    pub fn new() -> Self {
        let store = Self::disconnected();
        store.tracker.transition(ConnectionState::Ready);
        store
    }

    /// A store that rejects every command until moved to `Ready`
    pub fn disconnected() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            tracker: ConnectionTracker::new("Memory"),
        }
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ensure_ready(&self) -> CacheResult<()> {
        let state = self.tracker.current();
        if state.is_ready() {
            Ok(())
        } else {
            Err(CacheError::NotReady(state))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn state(&self) -> ConnectionState {
        self.tracker.current()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.ensure_ready()?;
        let now = Instant::now();
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        self.ensure_ready()?;
        let expires_at = ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl));
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.ensure_ready()?;
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store.set("key", "value", Some(5)).await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), Some("value".to_string()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get("key").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn entries_without_ttl_persist() {
        let store = MemoryStore::new();
        store.set("key", "value", None).await.unwrap();
        store.set("other", "value", None).await.unwrap();
        assert_eq!(store.len(), 2);

        store.delete("key").await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn disconnected_store_rejects_commands() {
        let store = MemoryStore::disconnected();
        assert!(matches!(
            store.set("key", "value", None).await,
            Err(CacheError::NotReady(ConnectionState::Disconnected))
        ));

        store.tracker().transition(ConnectionState::Ready);
        assert!(store.set("key", "value", None).await.is_ok());
    }
}
