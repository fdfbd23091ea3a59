//! Primitive codec for the Minecraft server-list ping protocol.
//!
//! Every packet on the wire is a VarInt length followed by the payload. VarInts
//! carry 7 bits per byte, least significant group first, with `0x80` as the
//! continuation bit, over the unsigned 32-bit domain.

use std::io::{self, Read};

use thiserror::Error;

/// Maximum number of bytes of an encoded VarInt.
pub const MAX_VARINT_LEN: usize = 5;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stream ended in the middle of a value.
    #[error("Stream truncated")]
    Truncated,

    /// The fifth VarInt byte still had its continuation bit set.
    #[error("VarInt too long")]
    VarIntTooLong,

    /// A packet did not carry the expected id.
    #[error("Unexpected packet ID={0}")]
    UnexpectedPacketId(i32),

    /// A length prefix is negative or too large.
    #[error("Invalid length {0}")]
    InvalidLength(i32),

    /// A string payload is not valid UTF-8.
    #[error("Invalid UTF-8 payload")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The status JSON has no `"online":` field.
    #[error("Missing online field")]
    MissingOnline,

    /// The `"online":` field is not a non-negative integer.
    #[error("Invalid online count '{0}'")]
    InvalidOnline(String),

    /// Underlying transport failure.
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            CodecError::Truncated
        } else {
            CodecError::Io(err)
        }
    }
}

/// Append a VarInt to `buf`.
///
/// Negative values are encoded through their two's complement bit pattern and
/// always take five bytes.
pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    while value & !u32::from(SEGMENT_BITS) != 0 {
        buf.push((value as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Encode a VarInt into a fresh buffer.
pub fn encode_varint(value: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN);
    write_varint(&mut buf, value);
    buf
}

/// Read a VarInt from `reader`.
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> Result<i32, CodecError> {
    let mut result: u32 = 0;
    for position in 0..MAX_VARINT_LEN {
        let byte = read_byte(reader)?;
        result |= u32::from(byte & SEGMENT_BITS) << (7 * position);
        if byte & CONTINUE_BIT == 0 {
            return Ok(result as i32);
        }
    }
    Err(CodecError::VarIntTooLong)
}

/// Decode a VarInt at the start of `bytes`, returning it with its encoded size.
pub fn decode_varint(bytes: &[u8]) -> Result<(i32, usize), CodecError> {
    let mut cursor = bytes;
    let value = read_varint(&mut cursor)?;
    Ok((value, bytes.len() - cursor.len()))
}

/// Append a VarInt-length-prefixed UTF-8 string to `buf`.
pub fn write_string(buf: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    write_varint(buf, bytes.len() as i32);
    buf.extend_from_slice(bytes);
}

/// Encode a string into a fresh buffer.
pub fn encode_string(value: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(value.len() + MAX_VARINT_LEN);
    write_string(&mut buf, value);
    buf
}

/// Wrap a packet payload (id + fields) with its VarInt length prefix.
pub fn frame_packet(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + MAX_VARINT_LEN);
    write_varint(&mut buf, payload.len() as i32);
    buf.extend_from_slice(payload);
    buf
}

fn read_byte<R: Read + ?Sized>(reader: &mut R) -> Result<u8, CodecError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}
