//! Broadcasting targets.

use std::fmt;

use online_linker_core::{ConfigAccessor, ConfigError, RawEntry, SharedStore, StoreError, TargetKind};
use tracing::warn;
use uuid::Uuid;

/// Destination of the broadcast local count.
pub trait BroadcastingTarget: Send + Sync + fmt::Debug {
    /// Publish `online`.
    fn broadcast(&self, online: i32) -> Result<(), StoreError>;

    /// Withdraw what this instance published.
    fn shutdown(&self) -> Result<(), StoreError>;

    /// Variant of this target.
    fn kind(&self) -> TargetKind;
}

/// Publishes the local count as one field of a shared hash.
///
/// The field name is this instance's server id, so every cooperating instance
/// owns exactly one field under `set_key`.
pub struct SharedStoreTarget {
    server_id: String,
    set_key: String,
    expire_seconds: Option<u32>,
    store: SharedStore,
}

impl SharedStoreTarget {
    /// Create a target. `expire_seconds <= 0` disables field expiration.
    pub fn new(
        server_id: impl Into<String>,
        set_key: impl Into<String>,
        expire_seconds: i64,
        store: SharedStore,
    ) -> Self {
        let expire_seconds = if expire_seconds > 0 {
            Some(u32::try_from(expire_seconds).unwrap_or(u32::MAX))
        } else {
            None
        };
        Self {
            server_id: server_id.into(),
            set_key: set_key.into(),
            expire_seconds,
            store,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn set_key(&self) -> &str {
        &self.set_key
    }

    pub fn expire_seconds(&self) -> Option<u32> {
        self.expire_seconds
    }
}

impl fmt::Debug for SharedStoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStoreTarget")
            .field("server_id", &self.server_id)
            .field("set_key", &self.set_key)
            .field("expire_seconds", &self.expire_seconds)
            .finish_non_exhaustive()
    }
}

impl BroadcastingTarget for SharedStoreTarget {
    fn broadcast(&self, online: i32) -> Result<(), StoreError> {
        self.store.hash_set(
            &self.set_key,
            &self.server_id,
            &online.to_string(),
            self.expire_seconds,
        )
    }

    fn shutdown(&self) -> Result<(), StoreError> {
        self.store.hash_delete(&self.set_key, &self.server_id)
    }

    fn kind(&self) -> TargetKind {
        TargetKind::SharedStore
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Constructor for one target variant.
pub type TargetConstructor =
    fn(&ConfigAccessor<'_>, Option<&SharedStore>) -> Result<Box<dyn BroadcastingTarget>, ConfigError>;

/// Constructor registered for `kind`.
pub fn constructor(kind: TargetKind) -> TargetConstructor {
    match kind {
        TargetKind::SharedStore => build_shared_store,
    }
}

/// Build one target from its raw entry.
pub fn build_target(
    entry: &RawEntry,
    store: Option<&SharedStore>,
) -> Result<Box<dyn BroadcastingTarget>, ConfigError> {
    let accessor = ConfigAccessor::new(entry);
    let type_name = accessor.get_str("type")?;
    let kind = TargetKind::parse(type_name)
        .ok_or_else(|| ConfigError::UnknownTargetType(type_name.to_string()))?;
    constructor(kind)(&accessor, store)
}

/// Build every entry, in order.
pub fn build_targets(
    entries: &[RawEntry],
    store: Option<&SharedStore>,
) -> Result<Vec<Box<dyn BroadcastingTarget>>, ConfigError> {
    entries.iter().map(|entry| build_target(entry, store)).collect()
}

fn build_shared_store(
    accessor: &ConfigAccessor<'_>,
    store: Option<&SharedStore>,
) -> Result<Box<dyn BroadcastingTarget>, ConfigError> {
    let server_id = match accessor.get_raw("server-id") {
        Some(_) => accessor.get_non_blank_str("server-id")?.to_string(),
        None => {
            let generated = Uuid::new_v4().to_string();
            warn!(
                "No server-id configured for shared-store target, using generated id {}",
                generated
            );
            generated
        }
    };
    let set_key = accessor.get_non_blank_str("set-key")?;
    let expire_seconds = accessor.get_i64_or("expire-seconds", 0)?;
    let store = store
        .cloned()
        .ok_or(ConfigError::MissingCapability("shared store"))?;

    Ok(Box::new(SharedStoreTarget::new(
        server_id,
        set_key,
        expire_seconds,
        store,
    )))
}
