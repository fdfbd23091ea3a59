//! Configuration model.
//!
//! This module defines the configuration snapshot consumed by the managers.
//! Reading it from disk is the host's job: every type here is plain serde, so
//! YAML, JSON or an in-memory builder all work.
//!
//! Source and target entries are kept as raw maps. Each variant reads its own
//! fields through a [`ConfigAccessor`] when the registries build it, which keeps
//! validation of variant-specific fields next to the variant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{ReplacementStrategy, SourceKind, TargetKind};

/// Errors that can occur while validating configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required key is absent.
    Missing(String),
    /// A key holds a value of the wrong type.
    InvalidType {
        key: String,
        expected: &'static str,
    },
    /// A key holds a value outside its allowed domain.
    InvalidValue { key: String, reason: String },
    /// A source entry names an unknown type.
    UnknownSourceType(String),
    /// A target entry names an unknown type.
    UnknownTargetType(String),
    /// A component needs a capability the host did not provide.
    MissingCapability(&'static str),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Missing configuration key: {}", key),
            ConfigError::InvalidType { key, expected } => {
                write!(f, "Value for key {} is not a {}", key, expected)
            }
            ConfigError::InvalidValue { key, reason } => {
                write!(f, "Invalid value for key {}: {}", key, reason)
            }
            ConfigError::UnknownSourceType(kind) => write!(f, "Unknown status source type: {}", kind),
            ConfigError::UnknownTargetType(kind) => {
                write!(f, "Unknown broadcasting target type: {}", kind)
            }
            ConfigError::MissingCapability(what) => write!(f, "Missing capability: {}", what),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A raw source or target entry.
pub type RawEntry = Map<String, Value>;

/// Typed read access to a raw configuration map.
#[derive(Debug, Clone, Copy)]
pub struct ConfigAccessor<'a> {
    map: &'a RawEntry,
    /// Parent key used in error messages (e.g. "proxy").
    section: Option<&'a str>,
}

impl<'a> ConfigAccessor<'a> {
    /// Wrap a raw entry.
    pub fn new(map: &'a RawEntry) -> Self {
        Self { map, section: None }
    }

    fn key_name(&self, key: &str) -> String {
        match self.section {
            Some(section) => format!("{}.{}", section, key),
            None => key.to_string(),
        }
    }

    /// Raw value, `None` when absent or null.
    pub fn get_raw(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    /// Check whether a non-null value exists.
    pub fn contains(&self, key: &str) -> bool {
        self.get_raw(key).is_some()
    }

    /// Required string.
    pub fn get_str(&self, key: &str) -> Result<&'a str, ConfigError> {
        match self.get_raw(key) {
            None => Err(ConfigError::Missing(self.key_name(key))),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(ConfigError::InvalidType {
                key: self.key_name(key),
                expected: "string",
            }),
        }
    }

    /// Optional string with a default.
    pub fn get_str_or(&self, key: &str, default: &'a str) -> Result<&'a str, ConfigError> {
        if self.contains(key) {
            self.get_str(key)
        } else {
            Ok(default)
        }
    }

    /// Required string that must contain non-whitespace characters.
    pub fn get_non_blank_str(&self, key: &str) -> Result<&'a str, ConfigError> {
        let value = self.get_str(key)?;
        if value.trim().is_empty() {
            return Err(ConfigError::invalid(&self.key_name(key), "must not be blank"));
        }
        Ok(value)
    }

    /// Required integer. Fractional numbers are truncated.
    pub fn get_i64(&self, key: &str) -> Result<i64, ConfigError> {
        match self.get_raw(key) {
            None => Err(ConfigError::Missing(self.key_name(key))),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| ConfigError::invalid(&self.key_name(key), "out of range")),
            Some(_) => Err(ConfigError::InvalidType {
                key: self.key_name(key),
                expected: "number",
            }),
        }
    }

    /// Optional integer with a default.
    pub fn get_i64_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        if self.contains(key) {
            self.get_i64(key)
        } else {
            Ok(default)
        }
    }

    /// Optional integer that must fit in `i32`.
    pub fn get_i32_or(&self, key: &str, default: i32) -> Result<i32, ConfigError> {
        let value = self.get_i64_or(key, i64::from(default))?;
        i32::try_from(value).map_err(|_| ConfigError::invalid(&self.key_name(key), "out of range"))
    }

    /// Optional boolean with a default.
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_raw(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(ConfigError::InvalidType {
                key: self.key_name(key),
                expected: "boolean",
            }),
        }
    }

    /// Nested map, `None` when absent.
    ///
    /// Error keys of the nested accessor are reported as `parent.key`, one
    /// level deep.
    pub fn get_sub(&self, key: &'a str) -> Result<Option<ConfigAccessor<'a>>, ConfigError> {
        match self.get_raw(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(ConfigAccessor {
                map,
                section: Some(key),
            })),
            Some(_) => Err(ConfigError::InvalidType {
                key: self.key_name(key),
                expected: "map",
            }),
        }
    }

    fn check_port(&self, key: &str, port: i64) -> Result<u16, ConfigError> {
        match u16::try_from(port) {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(ConfigError::invalid(
                &self.key_name(key),
                "port must be between 1 and 65535",
            )),
        }
    }

    /// Required TCP port in 1..=65535.
    pub fn get_port(&self, key: &str) -> Result<u16, ConfigError> {
        let port = self.get_i64(key)?;
        self.check_port(key, port)
    }

    /// Optional TCP port in 1..=65535 with a default.
    pub fn get_port_or(&self, key: &str, default: u16) -> Result<u16, ConfigError> {
        let port = self.get_i64_or(key, i64::from(default))?;
        self.check_port(key, port)
    }
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Full online-linker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Publishing of the local count to the shared store.
    pub broadcasting: BroadcastingSettings,

    /// Aggregation of the reported online count.
    pub status: StatusSettings,

    /// Shared store connection, only read by hosts that build the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_store: Option<SharedStoreSettings>,
}

/// Broadcasting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BroadcastingSettings {
    pub enabled: bool,

    /// Skip the write when the count did not change since the last tick.
    pub only_on_change: bool,

    /// Delay between two ticks, in milliseconds.
    #[serde(alias = "updating-interval-millis")]
    pub updating_interval: u64,

    /// Raw target entries, built by the target registry.
    pub targets: Vec<RawEntry>,
}

impl Default for BroadcastingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            only_on_change: false,
            updating_interval: 5_000,
            targets: Vec::new(),
        }
    }
}

/// Status settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StatusSettings {
    pub enabled: bool,

    /// Refresh period / cache lifetime in milliseconds, -1 disables expiration.
    #[serde(alias = "global-cache-expiration-millis")]
    pub global_cache_expiration: i64,

    /// Refresh from the calling thread instead of a background timer.
    pub request_on_demand: bool,

    /// In on-demand mode, refresh on a background worker and serve stale values.
    pub parallel_request_on_demand: bool,

    /// Scheduled mode only: pause the timer after this many milliseconds
    /// without reads, 0 disables.
    #[serde(alias = "inactivity-timeout-millis")]
    pub inactivity_timeout: i64,

    /// Raw source entries, built by the source registry.
    pub sources: Vec<RawEntry>,

    pub replacement: ReplacementSettings,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            global_cache_expiration: -1,
            request_on_demand: false,
            parallel_request_on_demand: false,
            inactivity_timeout: 0,
            sources: Vec::new(),
            replacement: ReplacementSettings::default(),
        }
    }
}

/// Host status response replacement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ReplacementSettings {
    pub strategy: ReplacementStrategy,
}

/// Shared store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SharedStoreSettings {
    /// Connection URL (e.g. "redis://127.0.0.1:6379/0").
    pub url: String,
}

// ============================================================================
// Validation
// ============================================================================

fn entry_type<'a>(entry: &'a RawEntry, section: &str, index: usize) -> Result<&'a str, ConfigError> {
    ConfigAccessor::new(entry)
        .get_str("type")
        .map_err(|_| ConfigError::Missing(format!("{}[{}].type", section, index)))
}

impl StatusSettings {
    /// Check the scheduling fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global_cache_expiration < -1 {
            return Err(ConfigError::invalid(
                "status.global-cache-expiration",
                "must be -1 or greater",
            ));
        }
        if self.enabled && !self.request_on_demand && self.global_cache_expiration <= 1 {
            return Err(ConfigError::invalid(
                "status.global-cache-expiration",
                "must be > 1 when not requesting on demand",
            ));
        }
        for (index, entry) in self.sources.iter().enumerate() {
            let kind = entry_type(entry, "status.sources", index)?;
            if SourceKind::parse(kind).is_none() {
                return Err(ConfigError::UnknownSourceType(kind.to_string()));
            }
        }
        Ok(())
    }

    /// Whether any source reads the shared store.
    pub fn uses_shared_store(&self) -> bool {
        self.sources.iter().any(|entry| {
            ConfigAccessor::new(entry)
                .get_str("type")
                .ok()
                .and_then(SourceKind::parse)
                == Some(SourceKind::SharedStore)
        })
    }
}

impl BroadcastingSettings {
    /// Check the ticking fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.updating_interval == 0 {
            return Err(ConfigError::invalid(
                "broadcasting.updating-interval",
                "must be greater than 0",
            ));
        }
        for (index, entry) in self.targets.iter().enumerate() {
            let kind = entry_type(entry, "broadcasting.targets", index)?;
            if TargetKind::parse(kind).is_none() {
                return Err(ConfigError::UnknownTargetType(kind.to_string()));
            }
        }
        Ok(())
    }

    /// Whether any target writes to the shared store.
    pub fn uses_shared_store(&self) -> bool {
        self.targets.iter().any(|entry| {
            ConfigAccessor::new(entry)
                .get_str("type")
                .ok()
                .and_then(TargetKind::parse)
                == Some(TargetKind::SharedStore)
        })
    }
}

impl Configuration {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broadcasting.validate()?;
        self.status.validate()?;
        if let Some(store) = &self.shared_store {
            if store.url.trim().is_empty() {
                return Err(ConfigError::invalid("shared-store.url", "must not be blank"));
            }
        }
        Ok(())
    }

    /// Whether an enabled section needs a shared store connection.
    pub fn needs_shared_store(&self) -> bool {
        (self.broadcasting.enabled && self.broadcasting.uses_shared_store())
            || (self.status.enabled && self.status.uses_shared_store())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(value: Value) -> RawEntry {
        match value {
            Value::Object(map) => map,
            _ => panic!("Expected object"),
        }
    }

    #[test]
    fn test_accessor_typed_getters() {
        let map = entry(json!({
            "host": "play.example.net",
            "port": 25566,
            "timeout": 1500.0,
            "cache-failure": true,
            "blank": "  ",
            "nothing": null,
            "proxy": { "type": "http", "host": "10.0.0.1", "port": 3128 }
        }));
        let accessor = ConfigAccessor::new(&map);

        assert_eq!(accessor.get_str("host").unwrap(), "play.example.net");
        assert_eq!(accessor.get_port_or("port", 25565).unwrap(), 25566);
        assert_eq!(accessor.get_i64("timeout").unwrap(), 1500);
        assert_eq!(accessor.get_i32_or("protocol", 759).unwrap(), 759);
        assert!(accessor.get_bool_or("cache-failure", false).unwrap());
        assert_eq!(accessor.get_str_or("nothing", "dflt").unwrap(), "dflt");

        let proxy = accessor.get_sub("proxy").unwrap().unwrap();
        assert_eq!(proxy.get_str("type").unwrap(), "http");
        assert_eq!(proxy.get_port("port").unwrap(), 3128);
        assert!(accessor.get_sub("missing").unwrap().is_none());
    }

    #[test]
    fn test_accessor_errors() {
        let map = entry(json!({
            "host": 12,
            "blank": "  ",
            "port": 70000,
            "zero": 0,
            "flag": "yes",
            "proxy": { "port": "x" }
        }));
        let accessor = ConfigAccessor::new(&map);

        assert_eq!(
            accessor.get_str("missing").unwrap_err(),
            ConfigError::Missing("missing".to_string())
        );
        assert_eq!(
            accessor.get_str("host").unwrap_err(),
            ConfigError::InvalidType {
                key: "host".to_string(),
                expected: "string"
            }
        );
        assert!(accessor.get_non_blank_str("blank").is_err());
        assert!(accessor.get_port("port").is_err());
        assert!(accessor.get_port("zero").is_err());
        assert!(accessor.get_bool_or("flag", false).is_err());

        let proxy = accessor.get_sub("proxy").unwrap().unwrap();
        assert_eq!(
            proxy.get_i64("port").unwrap_err(),
            ConfigError::InvalidType {
                key: "proxy.port".to_string(),
                expected: "number"
            }
        );
    }

    #[test]
    fn test_defaults() {
        let config: Configuration = serde_json::from_str("{}").unwrap();

        assert!(!config.status.enabled);
        assert_eq!(config.status.global_cache_expiration, -1);
        assert_eq!(config.status.inactivity_timeout, 0);
        assert_eq!(config.status.replacement.strategy, ReplacementStrategy::None);
        assert_eq!(config.broadcasting.updating_interval, 5_000);
        assert!(config.shared_store.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_kebab_case() {
        let config: Configuration = serde_json::from_value(json!({
            "broadcasting": {
                "enabled": true,
                "only-on-change": true,
                "updating-interval": 1000,
                "targets": [
                    { "type": "shared-store", "server-id": "proxy-1", "set-key": "online", "expire-seconds": 30 }
                ]
            },
            "status": {
                "enabled": true,
                "global-cache-expiration": 2000,
                "inactivity-timeout": 60000,
                "sources": [
                    { "type": "self" },
                    { "type": "ping", "host": "lobby", "cache-expiration": 5000 }
                ],
                "replacement": { "strategy": "delegate" }
            },
            "shared-store": { "url": "redis://127.0.0.1/" }
        }))
        .unwrap();

        assert!(config.broadcasting.only_on_change);
        assert_eq!(config.broadcasting.targets.len(), 1);
        assert_eq!(config.status.global_cache_expiration, 2000);
        assert_eq!(config.status.sources.len(), 2);
        assert_eq!(config.status.replacement.strategy, ReplacementStrategy::Delegate);
        assert!(config.validate().is_ok());
        assert!(config.needs_shared_store());
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result: Result<Configuration, _> = serde_json::from_value(json!({
            "status": { "replacement": { "strategy": "motd" } }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_scheduled_mode_requires_expiration() {
        let mut config = Configuration::default();
        config.status.enabled = true;
        config.status.global_cache_expiration = 1;
        assert!(config.validate().is_err());

        config.status.global_cache_expiration = 2;
        assert!(config.validate().is_ok());

        config.status.global_cache_expiration = -1;
        config.status.request_on_demand = true;
        assert!(config.validate().is_ok());

        config.status.global_cache_expiration = -2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_broadcasting_interval_must_be_positive() {
        let mut config = Configuration::default();
        config.broadcasting.enabled = true;
        config.broadcasting.updating_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_types_are_rejected() {
        let mut config = Configuration::default();
        config.status.sources.push(entry(json!({ "type": "query" })));
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::UnknownSourceType("query".to_string())
        );

        let mut config = Configuration::default();
        config.broadcasting.targets.push(entry(json!({ "set-key": "x" })));
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::Missing("broadcasting.targets[0].type".to_string())
        );
    }

    #[test]
    fn test_needs_shared_store_only_for_enabled_sections() {
        let mut config = Configuration::default();
        config.status.sources.push(entry(json!({ "type": "redis", "set-key": "online" })));
        assert!(!config.needs_shared_store());

        config.status.enabled = true;
        assert!(config.needs_shared_store());

        config.status.sources = vec![entry(json!({ "type": "self" }))];
        assert!(!config.needs_shared_store());
    }
}
