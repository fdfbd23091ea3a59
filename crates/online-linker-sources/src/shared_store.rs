//! Aggregate of the counts published by cooperating instances.

use std::fmt;

use online_linker_core::{SharedStore, SourceKind, FETCH_FAILED};
use tracing::{trace, warn};

use crate::source::StatusSource;

/// Source summing every value stored under a shared hash.
pub struct SharedStoreSource {
    set_key: String,
    store: SharedStore,
}

impl SharedStoreSource {
    pub fn new(set_key: impl Into<String>, store: SharedStore) -> Self {
        Self {
            set_key: set_key.into(),
            store,
        }
    }

    pub fn set_key(&self) -> &str {
        &self.set_key
    }
}

impl fmt::Debug for SharedStoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStoreSource")
            .field("set_key", &self.set_key)
            .finish_non_exhaustive()
    }
}

impl StatusSource for SharedStoreSource {
    fn fetch(&self) -> i32 {
        let values = match self.store.hash_values(&self.set_key) {
            Ok(values) => values,
            Err(e) => {
                warn!("Failed to read shared store key {}: {}", self.set_key, e);
                return FETCH_FAILED;
            }
        };

        let mut total: i64 = 0;
        for value in &values {
            match value.parse::<i32>() {
                Ok(count) => total += i64::from(count),
                Err(_) => trace!("Skipping unparseable value {:?} under {}", value, self.set_key),
            }
        }
        total.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SharedStore
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use online_linker_core::{KeyValueStore, MemoryStore, StoreError};
    use std::sync::Arc;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn hash_set(&self, _: &str, _: &str, _: &str, _: Option<u32>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        fn hash_delete(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        fn hash_values(&self, _: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[test]
    fn test_sums_parseable_values() {
        let store = Arc::new(MemoryStore::new());
        store.hash_set("online", "a", "3", None).unwrap();
        store.hash_set("online", "b", "4", None).unwrap();
        store.hash_set("online", "c", "garbage", None).unwrap();
        store.hash_set("other", "d", "100", None).unwrap();

        let source = SharedStoreSource::new("online", store);
        assert_eq!(source.fetch(), 7);
        assert_eq!(source.kind(), SourceKind::SharedStore);
    }

    #[test]
    fn test_absent_key_is_zero() {
        let source = SharedStoreSource::new("missing", Arc::new(MemoryStore::new()));
        assert_eq!(source.fetch(), 0);
    }

    #[test]
    fn test_store_failure_is_sentinel() {
        let source = SharedStoreSource::new("online", Arc::new(BrokenStore));
        assert_eq!(source.fetch(), FETCH_FAILED);
    }

    #[test]
    fn test_sum_saturates() {
        let store = Arc::new(MemoryStore::new());
        store.hash_set("online", "a", &i32::MAX.to_string(), None).unwrap();
        store.hash_set("online", "b", "10", None).unwrap();

        let source = SharedStoreSource::new("online", store);
        assert_eq!(source.fetch(), i32::MAX);
    }
}
