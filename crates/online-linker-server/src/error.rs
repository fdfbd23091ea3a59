//! Manager errors.

use online_linker_core::{ConfigError, ReplacementStrategy};
use thiserror::Error;

/// Errors raised while starting the managers.
///
/// Everything here is a startup failure. Once running, fetch and broadcast
/// failures are logged and never surface to the host.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The subsystem is disabled in configuration.
    #[error("{0} is disabled")]
    Disabled(&'static str),

    /// Scheduled mode needs a refresh period greater than 1 ms.
    #[error("Global cache expiration must be > 1 when not requesting on demand (got {0})")]
    InvalidExpiration(i64),

    /// Broadcasting needs a positive interval.
    #[error("Updating interval must be greater than 0")]
    InvalidInterval,

    /// Background work was requested outside a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The configuration reads or writes the shared store but none was given.
    #[error("A shared store is required by the configuration but none was provided")]
    MissingSharedStore,

    /// The host cannot apply the configured replacement strategy.
    #[error("Unsupported replacement strategy: {0}")]
    UnsupportedStrategy(ReplacementStrategy),

    /// Invalid source or target configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
