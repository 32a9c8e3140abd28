//! SIPOS event encoding.
//!
//! The device streams two-byte events and nothing else. The pulse height is
//! spread over the low six bits of the first byte and the low seven bits of
//! the second, inverted.

use ieapspect_io::FixedDecoder;

/// Queue the events are published under.
pub const EVENT_KIND: u8 = 0;
pub const EVENT_LEN: usize = 2;

pub fn decoder() -> FixedDecoder {
    FixedDecoder::new(EVENT_KIND, EVENT_LEN)
}

/// Pulse height of one event.
pub fn decode_value(a: u8, b: u8) -> u32 {
    (((u32::from(a) & 0x3f) << 6) | (u32::from(b) & 0x7f)) ^ 0xfff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_inverted() {
        assert_eq!(decode_value(0x00, 0x00), 0xfff);
        assert_eq!(decode_value(0x3f, 0x3f), 0x000);
        assert_eq!(decode_value(0x01, 0x02), 0xfff ^ 0x42);
    }

    #[test]
    fn marker_bits_are_ignored() {
        assert_eq!(decode_value(0xc1, 0x82), decode_value(0x01, 0x02));
    }

    #[test]
    fn value_fits_channel_range() {
        for a in [0x00, 0x15, 0x3f, 0xff] {
            for b in [0x00, 0x40, 0x7f, 0xff] {
                assert!(decode_value(a, b) < 4096);
            }
        }
    }
}
