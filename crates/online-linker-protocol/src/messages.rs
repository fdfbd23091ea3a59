//! Server-list ping messages.
//!
//! A status ping is a fixed exchange:
//! - Client → Server: Handshake (next state = status), then Status Request
//! - Server → Client: Status Response carrying a JSON document
//!
//! Only the player count is needed, so the JSON is scanned for the literal
//! `"online":` field instead of being parsed.

use std::io::{Read, Write};

use crate::codec::{frame_packet, read_varint, write_string, write_varint, CodecError};

/// Packet id shared by the handshake, status request and status response.
pub const STATUS_PACKET_ID: i32 = 0x00;

/// Handshake `next state` value selecting the status exchange.
pub const NEXT_STATE_STATUS: i32 = 1;

/// Protocol version sent when none is configured (1.19).
pub const DEFAULT_PROTOCOL_VERSION: i32 = 759;

/// Payload of the status request packet.
pub const STATUS_REQUEST_PAYLOAD: [u8; 1] = [0x00];

/// Largest status JSON accepted, in bytes.
pub const MAX_STATUS_JSON_LEN: i32 = 262_144;

const ONLINE_NEEDLE: &str = "\"online\":";

/// Build the handshake payload (unframed) for a status ping.
pub fn build_handshake_packet(protocol_version: i32, host: &str, port: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(host.len() + 16);
    write_varint(&mut buf, STATUS_PACKET_ID);
    write_varint(&mut buf, protocol_version);
    write_string(&mut buf, host);
    buf.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut buf, NEXT_STATE_STATUS);
    buf
}

/// Write the framed handshake followed by the framed status request.
pub fn write_status_request<W: Write + ?Sized>(
    writer: &mut W,
    handshake: &[u8],
) -> Result<(), CodecError> {
    let mut out = frame_packet(handshake);
    out.extend_from_slice(&frame_packet(&STATUS_REQUEST_PAYLOAD));
    writer.write_all(&out)?;
    writer.flush()?;
    Ok(())
}

/// Read a status response and return its JSON text.
pub fn read_status_response<R: Read + ?Sized>(reader: &mut R) -> Result<String, CodecError> {
    // Packet length, only used for framing.
    let _length = read_varint(reader)?;

    let packet_id = read_varint(reader)?;
    if packet_id != STATUS_PACKET_ID {
        return Err(CodecError::UnexpectedPacketId(packet_id));
    }

    let json_length = read_varint(reader)?;
    if !(0..=MAX_STATUS_JSON_LEN).contains(&json_length) {
        return Err(CodecError::InvalidLength(json_length));
    }

    let mut json = vec![0u8; json_length as usize];
    reader.read_exact(&mut json)?;
    Ok(String::from_utf8(json)?)
}

/// Extract the player count from a status JSON document.
///
/// Takes the text between `"online":` and the nearest following `,` or `}`
/// and parses it as a non-negative integer.
pub fn extract_online(json: &str) -> Result<i32, CodecError> {
    let start = json
        .find(ONLINE_NEEDLE)
        .map(|idx| idx + ONLINE_NEEDLE.len())
        .ok_or(CodecError::MissingOnline)?;
    let rest = &json[start..];
    let end = rest
        .find(|c| c == ',' || c == '}')
        .ok_or_else(|| CodecError::InvalidOnline(rest.trim().to_string()))?;

    let digits = rest[..end].trim();
    match digits.parse::<i32>() {
        Ok(online) if online >= 0 => Ok(online),
        _ => Err(CodecError::InvalidOnline(digits.to_string())),
    }
}

/// Complete status exchange over an established stream.
pub fn query_online<S: Read + Write + ?Sized>(
    stream: &mut S,
    handshake: &[u8],
) -> Result<i32, CodecError> {
    write_status_request(stream, handshake)?;
    let json = read_status_response(stream)?;
    extract_online(&json)
}

/// Encode a status response packet (used by test servers and tools).
pub fn encode_status_response(json: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(json.len() + 8);
    write_varint(&mut payload, STATUS_PACKET_ID);
    write_string(&mut payload, json);
    frame_packet(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_varint, encode_string};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_handshake_layout() {
        let packet = build_handshake_packet(759, "localhost", 25565);

        let mut expected = vec![0x00, 0xF7, 0x05];
        expected.extend_from_slice(&encode_string("localhost"));
        expected.extend_from_slice(&[0x63, 0xDD, 0x01]);
        assert_eq!(packet, expected);
    }

    #[test]
    fn test_write_status_request() {
        let handshake = build_handshake_packet(47, "a", 1);
        let mut out = Vec::new();
        write_status_request(&mut out, &handshake).unwrap();

        // [len=7][0x00 0x2F 0x01 'a' 0x00 0x01 0x01][len=1][0x00]
        assert_eq!(
            out,
            vec![0x07, 0x00, 0x2F, 0x01, b'a', 0x00, 0x01, 0x01, 0x01, 0x00]
        );
        let (len, size) = decode_varint(&out).unwrap();
        assert_eq!(len as usize, handshake.len());
        assert_eq!(size, 1);
    }

    #[test]
    fn test_read_status_response() {
        let bytes = encode_status_response("{\"online\":37}");
        let json = read_status_response(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(json, "{\"online\":37}");
    }

    #[test]
    fn test_read_rejects_other_packet_id() {
        let bytes = vec![0x02, 0x01, 0x00];
        let err = read_status_response(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedPacketId(1)));
    }

    #[test]
    fn test_read_truncated_json() {
        let mut bytes = encode_status_response("{\"online\":37}");
        bytes.truncate(bytes.len() - 3);
        let err = read_status_response(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, CodecError::Truncated));
    }

    #[test]
    fn test_read_rejects_oversized_json() {
        let mut bytes = vec![0x06, 0x00];
        bytes.extend_from_slice(&crate::codec::encode_varint(MAX_STATUS_JSON_LEN + 1));
        let err = read_status_response(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidLength(_)));
    }

    #[test]
    fn test_extract_online() {
        assert_eq!(extract_online("{\"online\":37}").unwrap(), 37);
        assert_eq!(
            extract_online(
                r#"{"version":{"name":"1.20.4","protocol":765},"players":{"max":100,"online":5,"sample":[]}}"#
            )
            .unwrap(),
            5
        );
        assert_eq!(
            extract_online(r#"{"players":{"max":10, "online": 8 }}"#).unwrap(),
            8
        );
    }

    #[test]
    fn test_extract_online_last_key_of_players() {
        assert_eq!(
            extract_online(r#"{"players":{"max":20,"online":3},"description":"x"}"#).unwrap(),
            3
        );
        assert_eq!(
            extract_online(r#"{"players":{"online":0},"version":{"protocol":759}}"#).unwrap(),
            0
        );
    }

    #[test]
    fn test_extract_online_failures() {
        assert!(matches!(
            extract_online("{\"online\":}"),
            Err(CodecError::InvalidOnline(_))
        ));
        assert!(matches!(
            extract_online("{\"players\":{\"max\":10}}"),
            Err(CodecError::MissingOnline)
        ));
        assert!(matches!(
            extract_online("{\"online\":\"many\"}"),
            Err(CodecError::InvalidOnline(_))
        ));
        assert!(matches!(
            extract_online("{\"online\":-3}"),
            Err(CodecError::InvalidOnline(_))
        ));
        assert!(matches!(
            extract_online("\"online\":12"),
            Err(CodecError::InvalidOnline(_))
        ));
    }

    #[test]
    fn test_query_online_over_duplex() {
        struct Duplex {
            input: Cursor<Vec<u8>>,
            output: Vec<u8>,
        }
        impl Read for Duplex {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.input.read(buf)
            }
        }
        impl Write for Duplex {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.output.write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut stream = Duplex {
            input: Cursor::new(encode_status_response(
                r#"{"players":{"max":20,"online":3}}"#,
            )),
            output: Vec::new(),
        };
        let handshake = build_handshake_packet(759, "lobby", 25565);

        assert_eq!(query_online(&mut stream, &handshake).unwrap(), 3);
        assert_eq!(stream.output.last(), Some(&0x00));
    }
}
