//! Initial handshake (protocol v10) and the client's response.

use super::{PacketReader, PacketWriter, capabilities, protocol_error};
use polystore_core::Error;

/// The server's greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// Scramble used by the auth plugins (both parts joined)
    pub auth_data: Vec<u8>,
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin: String,
}

impl Handshake {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);
        let protocol_version = reader.u8()?;
        if protocol_version != 10 {
            return Err(protocol_error(format!(
                "unsupported handshake protocol version {}",
                protocol_version
            )));
        }
        let server_version = reader.nul_string();
        let connection_id = reader.u32()?;
        let mut auth_data = reader.bytes(8)?.to_vec();
        reader.skip(1)?;
        let caps_lower = reader.u16()?;

        let mut handshake = Self {
            protocol_version,
            server_version,
            connection_id,
            auth_data: Vec::new(),
            capabilities: u32::from(caps_lower),
            charset: 0,
            status_flags: 0,
            auth_plugin: String::new(),
        };
        if reader.is_empty() {
            handshake.auth_data = auth_data;
            return Ok(handshake);
        }

        handshake.charset = reader.u8()?;
        handshake.status_flags = reader.u16()?;
        let caps_upper = reader.u16()?;
        handshake.capabilities |= u32::from(caps_upper) << 16;
        let auth_data_len = reader.u8()?;
        reader.skip(10)?;

        if handshake.capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let part2_len = usize::from(auth_data_len).saturating_sub(8).max(13);
            let part2 = reader.bytes(part2_len.min(reader.remaining()))?;
            let part2 = part2.strip_suffix(&[0]).unwrap_or(part2);
            auth_data.extend_from_slice(part2);
        }
        if handshake.capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            handshake.auth_plugin = reader.nul_string();
        }
        handshake.auth_data = auth_data;
        Ok(handshake)
    }
}

/// Fields of the `HandshakeResponse41` packet.
#[derive(Debug)]
pub struct HandshakeResponse<'a> {
    pub capabilities: u32,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin: &'a str,
}

impl HandshakeResponse<'_> {
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::with_capacity(64 + self.auth_response.len());
        w.u32(self.capabilities)
            .u32(self.max_packet_size)
            .u8(self.charset)
            .zeros(23)
            .nul_string(self.username);

        if self.capabilities & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            w.lenenc_bytes(self.auth_response);
        } else {
            w.u8(self.auth_response.len() as u8).bytes(self.auth_response);
        }
        if self.capabilities & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
            w.nul_string(self.database.unwrap_or_default());
        }
        if self.capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            w.nul_string(self.auth_plugin);
        }
        w.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketReader;

    fn greeting() -> Vec<u8> {
        let caps = capabilities::DEFAULT_CLIENT_FLAGS;
        let mut w = PacketWriter::new();
        w.u8(10)
            .nul_string("8.0.36")
            .u32(99)
            .bytes(b"abcdefgh")
            .u8(0)
            .u16((caps & 0xFFFF) as u16)
            .u8(255)
            .u16(2)
            .u16((caps >> 16) as u16)
            .u8(21)
            .zeros(10)
            .bytes(b"ijklmnopqrst\0")
            .nul_string("caching_sha2_password");
        w.into_inner()
    }

    #[test]
    fn test_parse_handshake_v10() {
        let hs = Handshake::parse(&greeting()).unwrap();
        assert_eq!(hs.server_version, "8.0.36");
        assert_eq!(hs.connection_id, 99);
        assert_eq!(hs.auth_data, b"abcdefghijklmnopqrst".to_vec());
        assert_eq!(hs.auth_plugin, "caching_sha2_password");
        assert_eq!(hs.capabilities, capabilities::DEFAULT_CLIENT_FLAGS);
    }

    #[test]
    fn test_reject_old_protocol() {
        let err = Handshake::parse(&[9, b'x', 0]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_encode_response() {
        let response = HandshakeResponse {
            capabilities: capabilities::DEFAULT_CLIENT_FLAGS,
            max_packet_size: 1 << 24,
            charset: 255,
            username: "app",
            auth_response: &[1, 2, 3],
            database: Some("shop"),
            auth_plugin: "mysql_native_password",
        }
        .encode();

        let mut reader = PacketReader::new(&response);
        assert_eq!(reader.u32().unwrap(), capabilities::DEFAULT_CLIENT_FLAGS);
        assert_eq!(reader.u32().unwrap(), 1 << 24);
        assert_eq!(reader.u8().unwrap(), 255);
        reader.skip(23).unwrap();
        assert_eq!(reader.nul_string(), "app");
        assert_eq!(reader.lenenc_bytes().unwrap(), &[1, 2, 3]);
        assert_eq!(reader.nul_string(), "shop");
        assert_eq!(reader.nul_string(), "mysql_native_password");
        assert!(reader.is_empty());
    }
}
