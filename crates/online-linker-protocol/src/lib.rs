//! # online-linker-protocol
//!
//! Minecraft server-list ping codec.
//!
//! This crate defines the VarInt framing and the handshake / status messages
//! used to read a remote server's player count. It is I/O agnostic: everything
//! works on `std::io::Read` / `Write`.

pub mod codec;
pub mod messages;

pub use codec::*;
pub use messages::*;
