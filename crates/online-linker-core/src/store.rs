//! Shared key-value store.
//!
//! Cooperating server instances publish their local count as one field of a
//! shared hash and read the whole hash back to aggregate. The store itself is
//! owned by the host and handed to sources and targets as a capability.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::clock::{Clock, SystemClock};

/// Errors reported by a shared store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be reached or its state is unusable.
    #[error("Shared store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected a command.
    #[error("Shared store command failed: {0}")]
    Command(String),

    /// Redis client error.
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Hash-oriented shared store operations used by online-linker.
///
/// All methods are synchronous; callers run them on refresh/broadcast worker
/// threads, never on an async executor thread.
pub trait KeyValueStore: Send + Sync {
    /// Set `field` of hash `key` to `value` and, when `expire_seconds` is set,
    /// refresh that field's expiration. Both happen in a single transaction.
    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        expire_seconds: Option<u32>,
    ) -> Result<(), StoreError>;

    /// Remove `field` from hash `key`.
    fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError>;

    /// All values currently stored in hash `key` (empty if the key is absent).
    fn hash_values(&self, key: &str) -> Result<Vec<String>, StoreError>;
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn KeyValueStore>;

#[derive(Debug, Clone)]
struct Field {
    value: String,
    /// Expiration in clock milliseconds.
    expires_at: Option<u64>,
}

impl Field {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process store.
///
/// Only shares counts between components of the same process; used by tests
/// and by standalone deployments without a shared backend.
pub struct MemoryStore {
    data: RwLock<HashMap<String, BTreeMap<String, Field>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store using the system clock for field expiration.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store with a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Get a live field value.
    pub fn hash_get(&self, key: &str, field: &str) -> Option<String> {
        let now = self.clock.now_millis();
        let data = self.data.read().ok()?;
        data.get(key)
            .and_then(|hash| hash.get(field))
            .filter(|f| f.is_live(now))
            .map(|f| f.value.clone())
    }

    /// Number of live fields in hash `key`.
    pub fn hash_len(&self, key: &str) -> usize {
        let now = self.clock.now_millis();
        match self.data.read() {
            Ok(data) => data
                .get(key)
                .map(|hash| hash.values().filter(|f| f.is_live(now)).count())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("memory store lock poisoned".to_string())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.data.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("MemoryStore").field("keys", &keys).finish()
    }
}

impl KeyValueStore for MemoryStore {
    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        expire_seconds: Option<u32>,
    ) -> Result<(), StoreError> {
        let now = self.clock.now_millis();
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        let hash = data.entry(key.to_string()).or_default();

        // HSET keeps an existing TTL unless it is refreshed in the same transaction.
        let previous_expiry = hash
            .get(field)
            .filter(|f| f.is_live(now))
            .and_then(|f| f.expires_at);
        let expires_at = match expire_seconds {
            Some(secs) => Some(now + u64::from(secs) * 1000),
            None => previous_expiry,
        };

        hash.insert(
            field.to_string(),
            Field {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        if let Some(hash) = data.get_mut(key) {
            hash.remove(field);
            if hash.is_empty() {
                data.remove(key);
            }
        }
        Ok(())
    }

    fn hash_values(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now_millis();
        let data = self.data.read().map_err(|_| Self::poisoned())?;
        Ok(data
            .get(key)
            .map(|hash| {
                hash.values()
                    .filter(|f| f.is_live(now))
                    .map(|f| f.value.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_and_read_values() {
        let store = MemoryStore::new();

        store.hash_set("online", "proxy-1", "12", None).unwrap();
        store.hash_set("online", "proxy-2", "30", None).unwrap();
        store.hash_set("other", "proxy-1", "99", None).unwrap();

        assert_eq!(store.hash_values("online").unwrap(), vec!["12", "30"]);
        assert_eq!(store.hash_get("online", "proxy-2").as_deref(), Some("30"));
        assert_eq!(store.hash_len("online"), 2);
    }

    #[test]
    fn test_missing_key_is_empty() {
        let store = MemoryStore::new();
        assert!(store.hash_values("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_overwrite_field() {
        let store = MemoryStore::new();

        store.hash_set("online", "proxy-1", "12", None).unwrap();
        store.hash_set("online", "proxy-1", "13", None).unwrap();

        assert_eq!(store.hash_values("online").unwrap(), vec!["13"]);
    }

    #[test]
    fn test_delete_field() {
        let store = MemoryStore::new();

        store.hash_set("online", "proxy-1", "12", None).unwrap();
        store.hash_set("online", "proxy-2", "5", None).unwrap();
        store.hash_delete("online", "proxy-1").unwrap();
        store.hash_delete("online", "unknown").unwrap();
        store.hash_delete("unknown", "proxy-1").unwrap();

        assert_eq!(store.hash_values("online").unwrap(), vec!["5"]);
    }

    #[test]
    fn test_field_expiration() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = MemoryStore::with_clock(clock.clone());

        store.hash_set("online", "proxy-1", "12", Some(10)).unwrap();
        store.hash_set("online", "proxy-2", "5", None).unwrap();

        clock.advance(9_999);
        assert_eq!(store.hash_len("online"), 2);

        clock.advance(1);
        assert_eq!(store.hash_values("online").unwrap(), vec!["5"]);
        assert_eq!(store.hash_get("online", "proxy-1"), None);
    }

    #[test]
    fn test_set_without_expiry_keeps_existing_ttl() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::with_clock(clock.clone());

        store.hash_set("online", "proxy-1", "1", Some(5)).unwrap();
        clock.advance(3_000);
        store.hash_set("online", "proxy-1", "2", None).unwrap();
        clock.advance(2_000);

        assert_eq!(store.hash_len("online"), 0);
    }

    #[test]
    fn test_refreshing_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::with_clock(clock.clone());

        store.hash_set("online", "proxy-1", "1", Some(5)).unwrap();
        clock.advance(4_000);
        store.hash_set("online", "proxy-1", "2", Some(5)).unwrap();
        clock.advance(4_000);

        assert_eq!(store.hash_get("online", "proxy-1").as_deref(), Some("2"));
    }
}
