//! Spectrig wire protocol: command frames out, fixed-size response frames in.
//!
//! Commands are six bytes:
//!
//! ```text
//! 0x55 cmd p0 p1 p2 xor(cmd, p0, p1, p2)
//! ```
//!
//! Responses are 526-byte frames (absolute offsets):
//!
//! ```text
//! 0        0xAA header
//! 1        frame type (0xFF spectro data, 0xFE command echo)
//! 2..514   256 big-endian samples
//! 514..516 big-endian sample count
//! 516      xor of bytes 1..516
//! 517..525 big-endian timestamp
//! 525      0xAF tail
//! ```
//!
//! The framer only trusts the header and tail markers. A candidate frame
//! whose tail is wrong costs exactly its header byte, so a single dropped
//! byte realigns on the next frame.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use ieapspect_core::error::{Error, Result};
use ieapspect_core::event::Event;
use ieapspect_core::property::PropertyDescriptor;
use ieapspect_io::{DecodeResult, Packet, PacketDecoder};

/// Command codes.
pub mod cmd {
    pub const TEST: u8 = 0x00;
    pub const BIAS: u8 = 0x07;
    pub const POWER: u8 = 0x41;
    pub const SET_THRESHOLD: u8 = 0x10;
    pub const SET_SAMPLE_RATE: u8 = 0xa0;
    pub const SET_SAMPLE_COUNT: u8 = 0xa1;
    pub const ENABLE: u8 = 0xa2;
    pub const SET_PRETRIG: u8 = 0xa3;
    pub const SET_TRIG_SRC: u8 = 0xa4;
    pub const SW_TRIGGER: u8 = 0xa5;
    pub const COND_OUT: u8 = 0xa6;
    pub const SET_SIGNAL_PARAMS: u8 = 0xa7;
    pub const CLEAR_SIGNAL_PARAMS: u8 = 0xa8;
}

/// Response frame types.
pub mod frame {
    pub const SPECTRO: u8 = 0xff;
    pub const CMD_ECHO: u8 = 0xfe;
}

pub const CMD_HEADER: u8 = 0x55;
pub const CMD_LEN: usize = 6;

pub const RESP_HEADER: u8 = 0xaa;
pub const RESP_TAIL: u8 = 0xaf;
pub const FRAME_LEN: usize = 526;

/// Sample slots in one frame.
pub const MAX_SAMPLES: usize = 256;

const SAMPLES_AT: usize = 2;
const COUNT_AT: usize = 514;
const CHECKSUM_AT: usize = 516;
const TIMESTAMP_AT: usize = 517;
const TAIL_AT: usize = 525;

/// What fires an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Threshold = 1,
    Software = 2,
    External = 3,
}

/// Write-only settings; the host cache is the only record of their values.
pub static PROPERTIES: [PropertyDescriptor; 4] = [
    PropertyDescriptor::new(cmd::SET_THRESHOLD, "Threshold", 2, 0..0x10000),
    PropertyDescriptor::new(cmd::SET_SAMPLE_RATE, "Sample Rate", 2, 0..0x10000),
    PropertyDescriptor::new(cmd::SET_SAMPLE_COUNT, "Sample Count", 2, 0..0x10000),
    PropertyDescriptor::new(cmd::SET_PRETRIG, "Pretrigger", 2, 0..0x10000),
];

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

pub fn encode_command(command: u8, params: [u8; 3]) -> [u8; CMD_LEN] {
    let [p0, p1, p2] = params;
    [CMD_HEADER, command, p0, p1, p2, xor(&[command, p0, p1, p2])]
}

/// Parameters for a 16-bit setting.
pub fn value_params(value: u16) -> [u8; 3] {
    let [hi, lo] = value.to_be_bytes();
    [0x00, hi, lo]
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Response framer. Spectro frames are published under
/// [`frame::SPECTRO`]; everything else is consumed and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectrigDecoder;

impl PacketDecoder for SpectrigDecoder {
    fn decode(&mut self, buf: &[u8]) -> DecodeResult {
        if buf.len() < FRAME_LEN {
            return DecodeResult::Incomplete;
        }
        // Header positions that still leave room for a whole frame.
        let candidates = buf.len() - FRAME_LEN + 1;
        let pos = match buf[..candidates].iter().position(|&b| b == RESP_HEADER) {
            Some(pos) => pos,
            None => {
                trace!(bytes = candidates, "no frame header, discarding");
                return DecodeResult::Discard(candidates);
            }
        };
        if pos > 0 {
            trace!(bytes = pos, "discarding bytes before frame header");
            return DecodeResult::Discard(pos);
        }
        if buf[TAIL_AT] != RESP_TAIL {
            debug!(tail = buf[TAIL_AT], "tail marker mismatch, resyncing");
            return DecodeResult::Discard(1);
        }
        match buf[1] {
            frame::SPECTRO => DecodeResult::Packet(
                Packet::new(frame::SPECTRO, Bytes::copy_from_slice(&buf[..FRAME_LEN])),
                FRAME_LEN,
            ),
            frame::CMD_ECHO => {
                trace!("command echo frame dropped");
                DecodeResult::Discard(FRAME_LEN)
            }
            other => {
                debug!(kind = other, "unknown frame type dropped");
                DecodeResult::Discard(FRAME_LEN)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Checksum byte over a frame's type, samples and count.
pub fn frame_checksum(frame: &[u8]) -> u8 {
    xor(&frame[1..CHECKSUM_AT])
}

/// Decode a spectro frame into an event.
///
/// With `verify` off the event's `checksum_valid` is `None`.
pub fn parse_frame(frame: &[u8], verify: bool) -> Result<Event> {
    if frame.len() != FRAME_LEN {
        return Err(Error::Protocol(format!("frame of {} bytes", frame.len())));
    }
    let count = usize::from(u16::from_be_bytes([frame[COUNT_AT], frame[COUNT_AT + 1]]));
    if count > MAX_SAMPLES {
        debug!(count, "sample count clamped");
    }
    let count = count.min(MAX_SAMPLES);

    let waveform = frame[SAMPLES_AT..SAMPLES_AT + count * 2]
        .chunks_exact(2)
        .map(|w| u16::from_be_bytes([w[0], w[1]]))
        .collect();
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&frame[TIMESTAMP_AT..TAIL_AT]);

    let mut event = Event::from_waveform(waveform).with_timestamp(u64::from_be_bytes(ts));
    if verify {
        let valid = frame_checksum(frame) == frame[CHECKSUM_AT];
        if !valid {
            warn!("frame checksum mismatch");
        }
        event.checksum_valid = Some(valid);
    }
    Ok(event)
}

/// Build a well-formed response frame.
#[cfg(test)]
pub(crate) fn test_frame(kind: u8, samples: &[u16], timestamp: u64) -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_LEN];
    frame[0] = RESP_HEADER;
    frame[1] = kind;
    for (i, s) in samples.iter().enumerate() {
        frame[SAMPLES_AT + 2 * i..SAMPLES_AT + 2 * i + 2].copy_from_slice(&s.to_be_bytes());
    }
    frame[COUNT_AT..COUNT_AT + 2].copy_from_slice(&(samples.len() as u16).to_be_bytes());
    frame[CHECKSUM_AT] = frame_checksum(&frame);
    frame[TIMESTAMP_AT..TAIL_AT].copy_from_slice(&timestamp.to_be_bytes());
    frame[TAIL_AT] = RESP_TAIL;
    frame
}
