//! # online-linker-core
//!
//! Core online-linker data model, shared store and configuration.
//!
//! This crate provides:
//! - Model types (fetch sentinel, host supplier, source/target kinds)
//! - The shared key-value store abstraction and an in-memory implementation
//! - A Redis-backed store (feature `redis`)
//! - Configuration types, raw entry accessor and validation
//! - Millisecond clocks
//!
//! This crate is intentionally runtime-agnostic and contains no async code.

pub mod clock;
pub mod config;
pub mod model;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BroadcastingSettings, ConfigAccessor, ConfigError, Configuration, RawEntry, ReplacementSettings,
    SharedStoreSettings, StatusSettings,
};
pub use model::*;
pub use store::{KeyValueStore, MemoryStore, SharedStore, StoreError};

#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
