//! Outbound TCP connections, optionally tunnelled through a proxy.
//!
//! Supported tunnels:
//! - SOCKS5 `CONNECT` without authentication (hostname resolved by the proxy)
//! - HTTP `CONNECT`

use std::io::{self, Read, Write};
use std::net::{IpAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socks::Socks5Stream;

const MAX_HTTP_HEADER_LEN: usize = 8192;

/// Proxy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Socks,
    Http,
}

impl ProxyKind {
    /// Parse a configuration value (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "socks" | "socks5" => Some(ProxyKind::Socks),
            "http" => Some(ProxyKind::Http),
            _ => None,
        }
    }
}

/// Proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
}

/// Open a TCP connection to `host:port`, through `proxy` when given.
///
/// `timeout` bounds the connect and every subsequent read/write on the
/// returned stream; `None` waits indefinitely. The SOCKS handshake itself
/// only has the system connect timeout.
pub fn connect(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
    proxy: Option<&ProxyConfig>,
) -> io::Result<TcpStream> {
    match proxy {
        None => connect_direct(host, port, timeout),
        Some(proxy) => match proxy.kind {
            ProxyKind::Socks => {
                let stream = Socks5Stream::connect((proxy.host.as_str(), proxy.port), (host, port))?
                    .into_inner();
                configure(&stream, timeout)?;
                Ok(stream)
            }
            ProxyKind::Http => {
                let mut stream = connect_direct(&proxy.host, proxy.port, timeout)?;
                http_connect(&mut stream, host, port)?;
                Ok(stream)
            }
        },
    }
}

fn configure(stream: &TcpStream, timeout: Option<Duration>) -> io::Result<()> {
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    stream.set_nodelay(true)
}

fn connect_direct(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                configure(&stream, timeout)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {}:{}", host, port),
        )
    }))
}

fn proxy_error(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::Other, message.into())
}

fn http_connect<S: Read + Write>(stream: &mut S, host: &str, port: u16) -> io::Result<()> {
    let authority = match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{}]:{}", host, port),
        _ => format!("{}:{}", host, port),
    };
    let request = format!(
        "CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\nProxy-Connection: Keep-Alive\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    // Byte by byte so nothing past the header is consumed.
    let mut header = Vec::with_capacity(128);
    let mut byte = [0u8; 1];
    while !header.ends_with(b"\r\n\r\n") {
        if header.len() >= MAX_HTTP_HEADER_LEN {
            return Err(proxy_error("HTTP proxy response header too large"));
        }
        stream.read_exact(&mut byte)?;
        header.push(byte[0]);
    }

    let header = String::from_utf8_lossy(&header);
    let status_line = header.lines().next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") || status != "200" {
        return Err(proxy_error(format!("HTTP proxy refused CONNECT: {}", status_line)));
    }
    Ok(())
}
