//! Redis-backed shared store.
//!
//! Provides a synchronous wrapper for the hash operations of [`KeyValueStore`].
//! Connection pooling, retries and topology are left to the Redis deployment.

use redis::{Client, Commands};

use crate::store::{KeyValueStore, StoreError};

/// Shared store on top of a Redis server.
pub struct RedisStore {
    /// The internal Redis client instance.
    client: Client,
}

impl RedisStore {
    /// Create a store from a connection string (e.g. "redis://127.0.0.1/").
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        Ok(Self { client })
    }

    /// Check that the server answers.
    pub fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection()?;
        let pong: String = redis::cmd("PING").query(&mut conn)?;
        if pong.trim().is_empty() {
            return Err(StoreError::Unavailable("empty PING reply".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl KeyValueStore for RedisStore {
    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        expire_seconds: Option<u32>,
    ) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection()?;

        // MULTI / EXEC so readers never observe a value without its TTL.
        let mut pipe = redis::pipe();
        pipe.atomic().hset(key, field, value).ignore();
        if let Some(seconds) = expire_seconds {
            pipe.cmd("HEXPIRE")
                .arg(key)
                .arg(seconds)
                .arg("FIELDS")
                .arg(1)
                .arg(field)
                .ignore();
        }
        pipe.query::<()>(&mut conn)?;
        Ok(())
    }

    fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection()?;
        let _: i64 = conn.hdel(key, field)?;
        Ok(())
    }

    fn hash_values(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.client.get_connection()?;
        let values: Vec<String> = conn.hvals(key)?;
        Ok(values)
    }
}
