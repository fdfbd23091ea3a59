//! Remote server-list ping source.

use std::fmt;
use std::time::Duration;

use online_linker_core::{SourceKind, FETCH_FAILED};
use online_linker_protocol::{build_handshake_packet, query_online, CodecError};
use tracing::warn;

use crate::proxy::{self, ProxyConfig};
use crate::source::StatusSource;

/// Default Minecraft server port.
pub const DEFAULT_PORT: u16 = 25565;

/// Default connect/read timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MILLIS: i64 = 5_000;

/// Source asking a remote server for its player count.
///
/// Every fetch opens and closes its own connection.
pub struct PingSource {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    protocol_version: i32,
    proxy: Option<ProxyConfig>,
    handshake: Vec<u8>,
}

impl PingSource {
    /// Create a ping source.
    ///
    /// `timeout_millis` of 0 (or negative) disables the timeout.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        timeout_millis: i64,
        protocol_version: i32,
        proxy: Option<ProxyConfig>,
    ) -> Self {
        let host = host.into();
        let handshake = build_handshake_packet(protocol_version, &host, port);
        let timeout = u64::try_from(timeout_millis)
            .ok()
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis);
        Self {
            host,
            port,
            timeout,
            protocol_version,
            proxy,
            handshake,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    /// Run one status exchange, surfacing the failure cause.
    pub fn ping(&self) -> Result<i32, CodecError> {
        let mut stream = proxy::connect(&self.host, self.port, self.timeout, self.proxy.as_ref())?;
        query_online(&mut stream, &self.handshake)
    }
}

impl fmt::Debug for PingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PingSource")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("protocol_version", &self.protocol_version)
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl StatusSource for PingSource {
    fn fetch(&self) -> i32 {
        match self.ping() {
            Ok(online) => online,
            Err(e) => {
                warn!("Failed to ping {}:{}: {}", self.host, self.port, e);
                FETCH_FAILED
            }
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Ping
    }
}
