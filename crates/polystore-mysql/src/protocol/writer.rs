//! Payload builder and packet framing.

use super::{MAX_PACKET_SIZE, PacketHeader};

/// Builds a packet payload.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn lenenc_int(&mut self, v: u64) -> &mut Self {
        match v {
            0..=250 => self.u8(v as u8),
            251..=0xFFFF => self.u8(0xFC).u16(v as u16),
            0x1_0000..=0xFF_FFFF => {
                let b = (v as u32).to_le_bytes();
                self.u8(0xFD).bytes(&b[..3])
            }
            _ => self.u8(0xFE).u64(v),
        }
    }

    pub fn lenenc_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.lenenc_int(data.len() as u64).bytes(data)
    }

    pub fn nul_string(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes()).u8(0)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Frame a payload into one or more packets, starting at `sequence_id`.
///
/// Returns the wire bytes and the next sequence id.
#[allow(clippy::cast_possible_truncation)]
pub fn frame(payload: &[u8], mut sequence_id: u8) -> (Vec<u8>, u8) {
    let mut out = Vec::with_capacity(payload.len() + PacketHeader::SIZE);
    let mut chunks = payload.chunks(MAX_PACKET_SIZE).peekable();
    if chunks.peek().is_none() {
        out.extend_from_slice(
            &PacketHeader {
                payload_length: 0,
                sequence_id,
            }
            .to_bytes(),
        );
        return (out, sequence_id.wrapping_add(1));
    }
    while let Some(chunk) = chunks.next() {
        out.extend_from_slice(
            &PacketHeader {
                payload_length: chunk.len() as u32,
                sequence_id,
            }
            .to_bytes(),
        );
        out.extend_from_slice(chunk);
        sequence_id = sequence_id.wrapping_add(1);
        // a full-size final chunk must be followed by an empty packet
        if chunks.peek().is_none() && chunk.len() == MAX_PACKET_SIZE {
            out.extend_from_slice(
                &PacketHeader {
                    payload_length: 0,
                    sequence_id,
                }
                .to_bytes(),
            );
            sequence_id = sequence_id.wrapping_add(1);
        }
    }
    (out, sequence_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketReader;

    #[test]
    fn test_lenenc_int_boundaries() {
        for (value, expected_len) in [
            (0u64, 1),
            (250, 1),
            (251, 3),
            (0xFFFF, 3),
            (0x1_0000, 4),
            (0xFF_FFFF, 4),
            (0x100_0000, 9),
        ] {
            let mut w = PacketWriter::new();
            w.lenenc_int(value);
            let bytes = w.into_inner();
            assert_eq!(bytes.len(), expected_len, "value {}", value);
            assert_eq!(PacketReader::new(&bytes).lenenc_int().unwrap(), value);
        }
    }

    #[test]
    fn test_chained_writes() {
        let mut w = PacketWriter::new();
        w.u8(0x16).nul_string("root").lenenc_bytes(b"xy").u16(0x0102);
        assert_eq!(
            w.into_inner(),
            vec![0x16, b'r', b'o', b'o', b't', 0, 2, b'x', b'y', 0x02, 0x01]
        );
    }

    #[test]
    fn test_frame_small_payload() {
        let (bytes, next) = frame(&[0x0e], 0);
        assert_eq!(bytes, vec![1, 0, 0, 0, 0x0e]);
        assert_eq!(next, 1);
    }

    #[test]
    fn test_frame_splits_large_payload() {
        let payload = vec![7u8; MAX_PACKET_SIZE + 10];
        let (bytes, next) = frame(&payload, 3);
        assert_eq!(next, 5);
        assert_eq!(&bytes[..4], &[0xFF, 0xFF, 0xFF, 3]);
        let second = PacketHeader::SIZE + MAX_PACKET_SIZE;
        assert_eq!(&bytes[second..second + 4], &[10, 0, 0, 4]);
        assert_eq!(bytes.len(), payload.len() + 2 * PacketHeader::SIZE);
    }

    #[test]
    fn test_frame_exact_max_adds_empty_packet() {
        let payload = vec![0u8; MAX_PACKET_SIZE];
        let (bytes, next) = frame(&payload, 0);
        assert_eq!(next, 2);
        assert_eq!(&bytes[bytes.len() - 4..], &[0, 0, 0, 1]);
    }
}
