//! Packet framing contract shared by all device framers.
//!
//! A framer looks at the front of the receive buffer and says one of three
//! things: here is a complete packet of this many bytes, these leading bytes
//! are garbage, or more bytes are needed. The IO task applies the verdict
//! and asks again until the buffer is exhausted.

use bytes::Bytes;

/// One framed unit of device output, tagged with its packet type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    kind: u8,
    bytes: Bytes,
}

impl Packet {
    pub fn new(kind: u8, bytes: impl Into<Bytes>) -> Self {
        Self {
            kind,
            bytes: bytes.into(),
        }
    }

    /// Packet type; selects the demultiplexer queue.
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// The whole packet as it appeared on the wire.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Everything after the leading type byte.
    pub fn body(&self) -> &[u8] {
        self.bytes.get(1..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of attempting to frame the front of a receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete packet, and how many buffer bytes it consumed.
    Packet(Packet, usize),
    /// The buffer does not hold a complete packet yet.
    Incomplete,
    /// Drop this many leading bytes and try again (resynchronization).
    Discard(usize),
}

/// A device family's framer.
///
/// Implementations must make progress: `Packet` and `Discard` always cover
/// at least one byte.
pub trait PacketDecoder: Send + 'static {
    fn decode(&mut self, buf: &[u8]) -> DecodeResult;
}

/// Packet kind used by [`RawDecoder`].
pub const RAW_KIND: u8 = 0;

/// Framer for untyped streams: every available byte is passed through as
/// one [`RAW_KIND`] chunk, to be consumed with a
/// [`ByteReader`](crate::reader::ByteReader).
#[derive(Debug, Default, Clone, Copy)]
pub struct RawDecoder;

impl PacketDecoder for RawDecoder {
    fn decode(&mut self, buf: &[u8]) -> DecodeResult {
        if buf.is_empty() {
            return DecodeResult::Incomplete;
        }
        DecodeResult::Packet(Packet::new(RAW_KIND, Bytes::copy_from_slice(buf)), buf.len())
    }
}

/// Framer for streams of fixed-size records with no type byte.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecoder {
    kind: u8,
    size: usize,
}

impl FixedDecoder {
    pub fn new(kind: u8, size: usize) -> Self {
        Self {
            kind,
            size: size.max(1),
        }
    }
}

impl PacketDecoder for FixedDecoder {
    fn decode(&mut self, buf: &[u8]) -> DecodeResult {
        if buf.len() < self.size {
            return DecodeResult::Incomplete;
        }
        DecodeResult::Packet(
            Packet::new(self.kind, Bytes::copy_from_slice(&buf[..self.size])),
            self.size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_body_skips_type_byte() {
        let p = Packet::new(0x83, vec![0x83, 0x01, 0x02, 0x01]);
        assert_eq!(p.kind(), 0x83);
        assert_eq!(p.body(), &[0x01, 0x02, 0x01]);
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn empty_packet_body() {
        let p = Packet::new(0, Bytes::new());
        assert!(p.is_empty());
        assert!(p.body().is_empty());
    }

    #[test]
    fn raw_decoder_takes_everything() {
        let mut d = RawDecoder;
        assert_eq!(d.decode(&[]), DecodeResult::Incomplete);
        assert_eq!(
            d.decode(&[1, 2, 3]),
            DecodeResult::Packet(Packet::new(RAW_KIND, vec![1, 2, 3]), 3)
        );
    }

    #[test]
    fn fixed_decoder_waits_for_full_record() {
        let mut d = FixedDecoder::new(7, 2);
        assert_eq!(d.decode(&[0xAB]), DecodeResult::Incomplete);
        assert_eq!(
            d.decode(&[0xAB, 0xCD, 0xEF]),
            DecodeResult::Packet(Packet::new(7, vec![0xAB, 0xCD]), 2)
        );
    }
}
