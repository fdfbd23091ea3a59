//! Declarative source construction.
//!
//! Each raw entry carries a `type` discriminator. The matching constructor
//! reads and validates its own fields, then the entry is wrapped in a
//! [`CacheLayerSource`] when it sets a positive `cache-expiration`.

use std::fmt;
use std::sync::Arc;

use online_linker_core::{
    Clock, ConfigAccessor, ConfigError, OnlineSupplier, RawEntry, SharedStore, SourceKind,
    SystemClock,
};
use online_linker_protocol::DEFAULT_PROTOCOL_VERSION;

use crate::cache_layer::CacheLayerSource;
use crate::ping::{PingSource, DEFAULT_PORT, DEFAULT_TIMEOUT_MILLIS};
use crate::proxy::{ProxyConfig, ProxyKind};
use crate::self_source::SelfSource;
use crate::shared_store::SharedStoreSource;
use crate::source::StatusSource;

/// Capabilities handed to source constructors.
#[derive(Clone)]
pub struct SourceContext {
    pub online_supplier: OnlineSupplier,
    pub store: Option<SharedStore>,
    pub clock: Arc<dyn Clock>,
}

impl SourceContext {
    pub fn new(online_supplier: OnlineSupplier) -> Self {
        Self {
            online_supplier,
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl fmt::Debug for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceContext")
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

/// Constructor for one source variant.
pub type SourceConstructor =
    fn(&ConfigAccessor<'_>, &SourceContext) -> Result<Box<dyn StatusSource>, ConfigError>;

/// Constructor registered for `kind`.
pub fn constructor(kind: SourceKind) -> SourceConstructor {
    match kind {
        SourceKind::SelfCount => build_self,
        SourceKind::Ping => build_ping,
        SourceKind::SharedStore => build_shared_store,
    }
}

/// Build one source from its raw entry.
pub fn build_source(
    entry: &RawEntry,
    ctx: &SourceContext,
) -> Result<Box<dyn StatusSource>, ConfigError> {
    let accessor = ConfigAccessor::new(entry);
    let type_name = accessor.get_str("type")?;
    let kind = SourceKind::parse(type_name)
        .ok_or_else(|| ConfigError::UnknownSourceType(type_name.to_string()))?;

    let source = constructor(kind)(&accessor, ctx)?;

    let cache_expiration = accessor.get_i64_or("cache-expiration", -1)?;
    if cache_expiration > 0 {
        let cache_failures = accessor.get_bool_or("cache-failure", false)?;
        return Ok(Box::new(CacheLayerSource::with_clock(
            source,
            cache_expiration as u64,
            cache_failures,
            ctx.clock.clone(),
        )));
    }
    Ok(source)
}

/// Build every entry, in order. The first invalid entry aborts.
pub fn build_sources(
    entries: &[RawEntry],
    ctx: &SourceContext,
) -> Result<Vec<Box<dyn StatusSource>>, ConfigError> {
    entries.iter().map(|entry| build_source(entry, ctx)).collect()
}

fn build_self(
    _accessor: &ConfigAccessor<'_>,
    ctx: &SourceContext,
) -> Result<Box<dyn StatusSource>, ConfigError> {
    Ok(Box::new(SelfSource::new(ctx.online_supplier.clone())))
}

fn build_ping(
    accessor: &ConfigAccessor<'_>,
    _ctx: &SourceContext,
) -> Result<Box<dyn StatusSource>, ConfigError> {
    let host = accessor.get_non_blank_str("host")?;
    let port = accessor.get_port_or("port", DEFAULT_PORT)?;
    let timeout = accessor.get_i64_or("timeout", DEFAULT_TIMEOUT_MILLIS)?;
    let protocol_version = if accessor.contains("protocol-version") {
        accessor.get_i32_or("protocol-version", DEFAULT_PROTOCOL_VERSION)?
    } else {
        accessor.get_i32_or("protocol", DEFAULT_PROTOCOL_VERSION)?
    };
    let proxy = match accessor.get_sub("proxy")? {
        Some(proxy) => Some(build_proxy(&proxy)?),
        None => None,
    };

    Ok(Box::new(PingSource::new(
        host,
        port,
        timeout,
        protocol_version,
        proxy,
    )))
}

fn build_proxy(accessor: &ConfigAccessor<'_>) -> Result<ProxyConfig, ConfigError> {
    let type_name = accessor.get_str_or("type", "socks")?;
    let kind = ProxyKind::parse(type_name).ok_or_else(|| {
        ConfigError::invalid("proxy.type", format!("unknown proxy type '{}'", type_name))
    })?;
    Ok(ProxyConfig {
        kind,
        host: accessor.get_non_blank_str("host")?.to_string(),
        port: accessor.get_port("port")?,
    })
}

fn build_shared_store(
    accessor: &ConfigAccessor<'_>,
    ctx: &SourceContext,
) -> Result<Box<dyn StatusSource>, ConfigError> {
    let set_key = accessor.get_non_blank_str("set-key")?;
    let store = ctx
        .store
        .clone()
        .ok_or(ConfigError::MissingCapability("shared store"))?;
    Ok(Box::new(SharedStoreSource::new(set_key, store)))
}
