//! # online-linker-sources
//!
//! Status sources for online-linker.
//!
//! This crate provides the [`StatusSource`] trait and its variants:
//! - [`SelfSource`]: the host's own count
//! - [`PingSource`]: a remote server polled with a server-list ping, optionally
//!   through a SOCKS5 or HTTP proxy
//! - [`SharedStoreSource`]: the sum of the counts published by cooperating
//!   instances
//! - [`CacheLayerSource`]: a caching decorator around any of the above
//!
//! Sources are built from raw configuration entries by [`build_sources`].

pub mod cache_layer;
pub mod ping;
pub mod proxy;
pub mod registry;
pub mod self_source;
pub mod shared_store;
pub mod source;

pub use cache_layer::CacheLayerSource;
pub use ping::PingSource;
pub use proxy::{ProxyConfig, ProxyKind};
pub use registry::{build_source, build_sources, SourceContext};
pub use self_source::SelfSource;
pub use shared_store::SharedStoreSource;
pub use source::StatusSource;
