//! SerSpect wire protocol: typed packets with a type+length table.
//!
//! Every packet starts with a one-byte type. Host→device packets are the
//! command bytes below, optionally followed by a property id and value.
//! Device→host packets have a length fixed by their type, except
//! GET-RESPONSE (length from the property width table) and WAVEFORM
//! (length from its sample-count byte).
//!
//! ```text
//! GET       03 <id>                    SET      04 <id> <value LE>
//! PONG      82                         EVENT    87 <value LE16>
//! GETRESP   83 <id> <value LE>         ERROR    ff <code>
//! WAVEFORM  88 <n> <n x sample BE16>
//! ```

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use ieapspect_core::error::{Error, Result};
use ieapspect_core::property::{self, PropertyDescriptor};
use ieapspect_io::{DecodeResult, Packet, PacketDecoder};

/// Packet type bytes.
pub mod packet {
    pub const NOP: u8 = 0x01;
    pub const PING: u8 = 0x02;
    pub const GET: u8 = 0x03;
    pub const SET: u8 = 0x04;
    pub const START: u8 = 0x05;
    pub const END: u8 = 0x06;

    pub const PONG: u8 = 0x82;
    pub const GET_RESPONSE: u8 = 0x83;
    pub const EVENT: u8 = 0x87;
    pub const WAVEFORM: u8 = 0x88;
    pub const ERROR: u8 = 0xff;
}

/// Property ids.
pub mod prop {
    pub const FW_VERSION: u8 = 0x01;
    pub const THRESHOLD: u8 = 0x02;
    pub const BIAS: u8 = 0x03;
    pub const AMP: u8 = 0x04;
    pub const RATIO_THRESHOLD: u8 = 0x05;
    pub const SERIAL_NUMBER: u8 = 0x06;
}

const FW_VERSION: PropertyDescriptor =
    PropertyDescriptor::new(prop::FW_VERSION, "Firmware Version", 2, 0..0x10000);
const THRESHOLD: PropertyDescriptor =
    PropertyDescriptor::new(prop::THRESHOLD, "Threshold", 2, 0..4096);
const BIAS: PropertyDescriptor = PropertyDescriptor::new(prop::BIAS, "Bias", 1, 0..2);
const AMP: PropertyDescriptor = PropertyDescriptor::new(prop::AMP, "Amp", 1, 0..2);
const RATIO_THRESHOLD: PropertyDescriptor =
    PropertyDescriptor::new(prop::RATIO_THRESHOLD, "Ratio Thresh", 2, 0..100);
const SERIAL_NUMBER: PropertyDescriptor =
    PropertyDescriptor::new(prop::SERIAL_NUMBER, "Serial Number", 2, 0..0x10000);

/// Every property the firmware knows.
pub static PROPERTIES: [PropertyDescriptor; 6] = [
    FW_VERSION,
    THRESHOLD,
    BIAS,
    AMP,
    RATIO_THRESHOLD,
    SERIAL_NUMBER,
];

/// The operator-configurable subset.
pub static CONFIG_PROPERTIES: [PropertyDescriptor; 4] = [THRESHOLD, RATIO_THRESHOLD, BIAS, AMP];

/// Number of NOPs written on connect to push the firmware parser back to a
/// packet boundary.
pub const NOP_BURST: usize = 100;

/// Firmware error codes carried by ERROR packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    Unknown,
    InvalidKey,
    InvalidOperation,
    Other(u8),
}

impl From<u8> for DeviceError {
    fn from(code: u8) -> Self {
        match code {
            1 => DeviceError::Unknown,
            2 => DeviceError::InvalidKey,
            3 => DeviceError::InvalidOperation,
            other => DeviceError::Other(other),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Unknown => f.write_str("unknown error"),
            DeviceError::InvalidKey => f.write_str("invalid property key"),
            DeviceError::InvalidOperation => f.write_str("invalid operation"),
            DeviceError::Other(code) => write!(f, "error code {code}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

pub fn encode_nop_burst() -> Vec<u8> {
    vec![packet::NOP; NOP_BURST]
}

pub fn encode_get(id: u8) -> Vec<u8> {
    vec![packet::GET, id]
}

/// Encode a SET, rejecting unknown ids and out-of-range values.
pub fn encode_set(id: u8, value: u32) -> Result<Vec<u8>> {
    let desc = property::require(&PROPERTIES, id)?;
    let mut out = vec![packet::SET, id];
    out.extend(desc.encode(value)?);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Total length of the packet at the front of `buf`.
///
/// `Ok(None)` means more bytes are needed to tell; `Err(())` means the
/// front byte cannot start a packet.
fn packet_len(buf: &[u8]) -> std::result::Result<Option<usize>, ()> {
    match buf[0] {
        packet::PONG => Ok(Some(1)),
        packet::ERROR => Ok(Some(2)),
        packet::EVENT => Ok(Some(3)),
        packet::GET_RESPONSE => match buf.get(1) {
            None => Ok(None),
            Some(&id) => match property::lookup(&PROPERTIES, id) {
                Some(desc) => Ok(Some(2 + desc.width)),
                None => Err(()),
            },
        },
        packet::WAVEFORM => match buf.get(1) {
            None => Ok(None),
            Some(&n) => Ok(Some(2 + 2 * n as usize)),
        },
        _ => Err(()),
    }
}

/// Framer for the SerSpect byte stream.
///
/// Bytes that cannot start a packet are dropped one at a time until the
/// stream lines up again. A GET-RESPONSE naming an unknown property cannot
/// be length-classified, so its type byte is dropped the same way.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerSpectDecoder;

impl PacketDecoder for SerSpectDecoder {
    fn decode(&mut self, buf: &[u8]) -> DecodeResult {
        match packet_len(buf) {
            Ok(Some(len)) if buf.len() >= len => {
                DecodeResult::Packet(Packet::new(buf[0], Bytes::copy_from_slice(&buf[..len])), len)
            }
            Ok(_) => DecodeResult::Incomplete,
            Err(()) => {
                if buf[0] == packet::GET_RESPONSE {
                    debug!(id = buf[1], "response for unknown property, resyncing");
                } else {
                    trace!(byte = buf[0], "unexpected byte, resyncing");
                }
                DecodeResult::Discard(1)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Pulse height of an EVENT packet.
pub fn parse_event(packet: &Packet) -> Result<u32> {
    match packet.body() {
        &[lo, hi] => Ok(u32::from(u16::from_le_bytes([lo, hi]))),
        other => Err(Error::Protocol(format!("EVENT body of {} bytes", other.len()))),
    }
}

/// Property id and value of a GET-RESPONSE packet.
pub fn parse_get_response(packet: &Packet) -> Result<(u8, u32)> {
    let body = packet.body();
    let (&id, value) = body
        .split_first()
        .ok_or_else(|| Error::Protocol("empty GET-RESPONSE".into()))?;
    let desc = property::require(&PROPERTIES, id)?;
    Ok((id, desc.decode(value)?))
}

/// Error code of an ERROR packet.
pub fn parse_error(packet: &Packet) -> Result<u8> {
    packet
        .body()
        .first()
        .copied()
        .ok_or_else(|| Error::Protocol("empty ERROR packet".into()))
}

/// Samples of a WAVEFORM packet (big-endian on the wire).
pub fn parse_waveform(packet: &Packet) -> Result<Vec<u16>> {
    let (&n, samples) = packet
        .body()
        .split_first()
        .ok_or_else(|| Error::Protocol("empty WAVEFORM packet".into()))?;
    if samples.len() != 2 * n as usize {
        return Err(Error::Protocol(format!(
            "WAVEFORM announces {} samples, carries {} bytes",
            n,
            samples.len()
        )));
    }
    Ok(samples
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Firmware version word rendered as `"major.minor"`.
pub fn format_fw_version(raw: u32) -> String {
    format!("{}.{}", (raw >> 8) & 0xff, raw & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_all(mut input: &[u8]) -> (Vec<Packet>, usize) {
        let mut decoder = SerSpectDecoder;
        let mut packets = Vec::new();
        while !input.is_empty() {
            match decoder.decode(input) {
                DecodeResult::Packet(p, n) => {
                    packets.push(p);
                    input = &input[n..];
                }
                DecodeResult::Discard(n) => input = &input[n..],
                DecodeResult::Incomplete => break,
            }
        }
        (packets, input.len())
    }

    #[test]
    fn set_threshold_encoding() {
        assert_eq!(
            encode_set(prop::THRESHOLD, 1000).unwrap(),
            vec![0x04, 0x02, 0xE8, 0x03]
        );
        assert_eq!(encode_set(prop::BIAS, 1).unwrap(), vec![0x04, 0x03, 0x01]);
    }

    #[test]
    fn set_rejects_bad_values() {
        assert!(matches!(
            encode_set(prop::THRESHOLD, 5000),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            encode_set(prop::RATIO_THRESHOLD, 100),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(encode_set(0x42, 0), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn get_and_nop_encoding() {
        assert_eq!(encode_get(prop::FW_VERSION), vec![0x03, 0x01]);
        let burst = encode_nop_burst();
        assert_eq!(burst.len(), 100);
        assert!(burst.iter().all(|&b| b == packet::NOP));
    }

    #[test]
    fn event_is_little_endian() {
        let (packets, rest) = frame_all(&[0x87, 0xC8, 0x00]);
        assert_eq!(rest, 0);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].kind(), packet::EVENT);
        assert_eq!(parse_event(&packets[0]).unwrap(), 200);
    }

    #[test]
    fn get_response_length_follows_property_width() {
        let (packets, _) = frame_all(&[0x83, 0x03, 0x01, 0x83, 0x02, 0xE8, 0x03]);
        assert_eq!(packets.len(), 2);
        assert_eq!(parse_get_response(&packets[0]).unwrap(), (prop::BIAS, 1));
        assert_eq!(parse_get_response(&packets[1]).unwrap(), (prop::THRESHOLD, 1000));
    }

    #[test]
    fn garbage_is_skipped() {
        let input = [0x42, 0x00, 0x87, 0xC8, 0x00, 0x13, 0x82, 0xff, 0x02];
        let (packets, rest) = frame_all(&input);
        assert_eq!(rest, 0);
        let kinds: Vec<u8> = packets.iter().map(Packet::kind).collect();
        assert_eq!(kinds, vec![packet::EVENT, packet::PONG, packet::ERROR]);
        assert_eq!(parse_error(&packets[2]).unwrap(), 2);
    }

    #[test]
    fn unknown_property_response_resyncs() {
        // 0x83 0x42 cannot be classified; 0x42 is not a type either.
        let (packets, rest) = frame_all(&[0x83, 0x42, 0x87, 0x05, 0x00]);
        assert_eq!(rest, 0);
        assert_eq!(packets.len(), 1);
        assert_eq!(parse_event(&packets[0]).unwrap(), 5);
    }

    #[test]
    fn partial_packets_wait() {
        let mut decoder = SerSpectDecoder;
        assert_eq!(decoder.decode(&[0x87, 0xC8]), DecodeResult::Incomplete);
        assert_eq!(decoder.decode(&[0x83]), DecodeResult::Incomplete);
        assert_eq!(decoder.decode(&[0x83, 0x02, 0xE8]), DecodeResult::Incomplete);
        assert_eq!(decoder.decode(&[0x88, 0x02, 0x00]), DecodeResult::Incomplete);
    }

    #[test]
    fn waveform_samples_are_big_endian() {
        let (packets, _) = frame_all(&[0x88, 0x03, 0x00, 0x10, 0x01, 0x00, 0x00, 0x02]);
        assert_eq!(packets.len(), 1);
        assert_eq!(parse_waveform(&packets[0]).unwrap(), vec![0x0010, 0x0100, 0x0002]);
    }

    #[test]
    fn empty_waveform() {
        let (packets, _) = frame_all(&[0x88, 0x00]);
        assert_eq!(parse_waveform(&packets[0]).unwrap(), Vec::<u16>::new());
    }

    #[test]
    fn device_error_codes() {
        assert_eq!(DeviceError::from(1), DeviceError::Unknown);
        assert_eq!(DeviceError::from(2), DeviceError::InvalidKey);
        assert_eq!(DeviceError::from(3), DeviceError::InvalidOperation);
        assert_eq!(DeviceError::from(9).to_string(), "error code 9");
    }

    #[test]
    fn property_table_round_trips() {
        for desc in &PROPERTIES {
            for v in desc.range.clone() {
                let bytes = desc.encode(v).unwrap();
                assert_eq!(bytes.len(), desc.width, "{}", desc.name);
                assert_eq!(desc.decode(&bytes).unwrap(), v, "{}", desc.name);
            }
            assert!(desc.encode(desc.range.end).is_err(), "{}", desc.name);
        }
    }

    #[test]
    fn fw_version_format() {
        assert_eq!(format_fw_version(0x0102), "1.2");
        assert_eq!(format_fw_version(0x0A00), "10.0");
    }
}
