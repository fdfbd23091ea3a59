//! Online-linker data model types.
//!
//! These types are shared by every layer:
//! - The fetch failure sentinel and the host supplier type
//! - Source and target kind discriminators used by the registries
//! - The replacement strategy a host applies to its status responses

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Count returned by a source when no usable value could be fetched.
///
/// Managers treat any negative count as a failure, this is the canonical one.
pub const FETCH_FAILED: i32 = -1;

/// Host accessor returning the local online count.
///
/// It may be invoked from refresh and broadcast threads, so it must be cheap.
pub type OnlineSupplier = Arc<dyn Fn() -> i32 + Send + Sync>;

/// Wrap a closure into an [`OnlineSupplier`].
pub fn online_supplier<F>(f: F) -> OnlineSupplier
where
    F: Fn() -> i32 + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Discriminator of a status source variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Local count reported by the host.
    #[serde(rename = "self")]
    SelfCount,
    /// Remote server polled with a server-list ping.
    Ping,
    /// Sum of the per-instance counts published in the shared store.
    #[serde(alias = "redis")]
    SharedStore,
}

impl SourceKind {
    /// All kinds, in registry order.
    pub const ALL: [SourceKind; 3] = [SourceKind::SelfCount, SourceKind::Ping, SourceKind::SharedStore];

    /// Configuration discriminator of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::SelfCount => "self",
            SourceKind::Ping => "ping",
            SourceKind::SharedStore => "shared-store",
        }
    }

    /// Parse a configuration discriminator (case-insensitive, `redis` is accepted
    /// as a legacy name of `shared-store`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "self" => Some(SourceKind::SelfCount),
            "ping" => Some(SourceKind::Ping),
            "shared-store" | "shared_store" | "redis" => Some(SourceKind::SharedStore),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminator of a broadcasting target variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// Per-instance field in a shared store hash.
    #[serde(alias = "redis")]
    SharedStore,
}

impl TargetKind {
    /// Configuration discriminator of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::SharedStore => "shared-store",
        }
    }

    /// Parse a configuration discriminator (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "shared-store" | "shared_store" | "redis" => Some(TargetKind::SharedStore),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the host replaces the online count in its status responses.
///
/// Unknown values are rejected when the configuration is deserialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacementStrategy {
    /// The host keeps its own count, no hook is installed.
    #[default]
    None,
    /// Each status response reports the aggregated online count.
    Delegate,
}

impl fmt::Display for ReplacementStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementStrategy::None => f.write_str("none"),
            ReplacementStrategy::Delegate => f.write_str("delegate"),
        }
    }
}
