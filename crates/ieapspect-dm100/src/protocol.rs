//! DM100 wire formats: two-byte commands out, 16-bit big-endian words in.
//!
//! The event stream has no type bytes or markers. Its layout is implied by
//! the current register configuration, so the reader decides how many words
//! make up an event from the cached registers:
//!
//! ```text
//! [header0 header1]  if PACKCFG.add_header
//! n                  sample count
//! n x sample
//! [t0 t1 t2]         if PACKCFG.add_time     timestamp = t0<<32 | t1<<16 | t2
//! [lost]             if MASKCFG.add_lost
//! [checksum]         if PACKCFG.add_checksum sum of all prior words, mod 2^16
//! ```

use ieapspect_core::error::{Error, Result};
use ieapspect_core::event::{Event, EventHeader};

use crate::registers::{AcquisitionMode, RegisterFile, field};

/// Masked-read selector for firmware version and sample rate.
pub const MASK_FIRMWARE: u16 = 1;
/// Masked-read selector for the analog front-end description.
pub const MASK_FRONTEND: u16 = 2;

/// Bytes returned by one masked read.
pub const MASKED_READ_LEN: usize = 4;

pub fn encode_command(command: u8, data: u8) -> [u8; 2] {
    [command, data]
}

/// Event word layout implied by the register configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLayout {
    /// Raw MODECFG mode bits.
    pub mode: u16,
    pub header: bool,
    pub time: bool,
    pub lost: bool,
    pub checksum: bool,
}

impl EventLayout {
    pub fn from_registers(regs: &RegisterFile) -> Result<Self> {
        Ok(Self {
            mode: regs.field(field::MODE)?,
            header: regs.flag(field::ADD_HEADER)?,
            time: regs.flag(field::ADD_TIME)?,
            lost: regs.flag(field::ADD_LOST)?,
            checksum: regs.flag(field::ADD_CHECKSUM)?,
        })
    }

    /// Words up to and including the sample count.
    pub fn prefix_words(&self) -> usize {
        if self.header { 3 } else { 1 }
    }

    /// Words after the samples.
    pub fn suffix_words(&self) -> usize {
        (if self.time { 3 } else { 0 })
            + usize::from(self.lost)
            + usize::from(self.checksum)
    }
}

/// Decode one complete event from its words.
///
/// `words` must hold exactly `prefix + n + suffix` words, where `n` is the
/// sample count at the end of the prefix.
pub fn decode_event(layout: &EventLayout, words: &[u16]) -> Result<Event> {
    let prefix = layout.prefix_words();
    let count = *words
        .get(prefix - 1)
        .ok_or_else(|| Error::Protocol("event shorter than its prefix".into()))?
        as usize;
    let expected = prefix + count + layout.suffix_words();
    if words.len() != expected {
        return Err(Error::Protocol(format!(
            "event of {} words, layout expects {}",
            words.len(),
            expected
        )));
    }

    let samples = &words[prefix..prefix + count];
    let first = *samples
        .first()
        .ok_or_else(|| Error::Protocol("event without samples".into()))?;

    let mut event = match AcquisitionMode::from_bits(layout.mode) {
        Some(AcquisitionMode::Waveform) => Event::from_waveform(samples.to_vec()),
        Some(AcquisitionMode::SampleTot) => {
            let mut ev = Event::new(u32::from(first));
            ev.time_over_threshold = samples.get(1).copied();
            ev
        }
        Some(AcquisitionMode::Sample) | None => Event::new(u32::from(first)),
    };

    if layout.header {
        event.header = Some(EventHeader {
            word0: words[0],
            word1: words[1],
            packet_id: ((words[1] >> 8) & 0x0F) as u8,
        });
    }

    let mut pos = prefix + count;
    if layout.time {
        let t = &words[pos..pos + 3];
        event.timestamp =
            Some((u64::from(t[0]) << 32) | (u64::from(t[1]) << 16) | u64::from(t[2]));
        pos += 3;
    }
    if layout.lost {
        event.lost = Some(words[pos]);
        pos += 1;
    }
    if layout.checksum {
        let sum = words[..pos]
            .iter()
            .fold(0u16, |acc, &w| acc.wrapping_add(w));
        event.checksum_valid = Some(sum == words[pos]);
    }
    Ok(event)
}

/// Analog front-end op-amp family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpAmp {
    Ltc,
    Ada,
}

/// Hardware description read from the digitizer during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub fw_version: String,
    /// Sample rate in mega-samples per second.
    pub msps: u8,
    /// ADC resolution in bits.
    pub resolution_bits: u8,
    pub op_amp: OpAmp,
    pub divider: u8,
    pub termination_ohms: u16,
    pub external_reference: bool,
    pub iref_range: f32,
    pub dc_coupled: bool,
}

/// Decode the firmware and front-end masked reads.
pub fn decode_diagnostics(firmware: &[u8], frontend: &[u8]) -> Result<Diagnostics> {
    if firmware.len() < 2 || frontend.len() < 2 {
        return Err(Error::Protocol("short diagnostic read".into()));
    }
    let (m1, m2) = (firmware, frontend);
    Ok(Diagnostics {
        fw_version: format!("{}.{}", (m1[0] >> 3) & 0x1f, m1[0] & 0x07),
        msps: m1[1],
        resolution_bits: (m2[1] & 0x0f) + 1,
        op_amp: if m2[0] & 0x80 != 0 { OpAmp::Ltc } else { OpAmp::Ada },
        divider: if m2[0] & 0x40 != 0 { 5 } else { 1 },
        termination_ohms: if m2[0] & 0x20 != 0 { 50 } else { 1000 },
        external_reference: m2[0] & 0x10 == 0,
        iref_range: if m2[0] & 0x08 != 0 { 1.0 } else { 0.5 },
        dc_coupled: m2[0] & 0x04 != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Dm100Register;
    use ieapspect_core::register::RegisterWriter;

    fn layout(mode: AcquisitionMode) -> EventLayout {
        EventLayout {
            mode: mode as u16,
            header: false,
            time: false,
            lost: false,
            checksum: false,
        }
    }

    #[test]
    fn command_is_two_bytes() {
        assert_eq!(encode_command(140, 0x40), [140, 0x40]);
    }

    #[test]
    fn layout_word_counts() {
        let full = EventLayout {
            mode: 0,
            header: true,
            time: true,
            lost: true,
            checksum: true,
        };
        assert_eq!(full.prefix_words(), 3);
        assert_eq!(full.suffix_words(), 5);
        let bare = layout(AcquisitionMode::Sample);
        assert_eq!(bare.prefix_words(), 1);
        assert_eq!(bare.suffix_words(), 0);
    }

    struct NullWriter;

    #[async_trait::async_trait]
    impl RegisterWriter for NullWriter {
        async fn write_command(&self, _command: u8, _data: u8) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn layout_follows_registers() {
        let mut regs = RegisterFile::new();
        // add_time + bus8, add_lost, waveform mode
        regs.get_mut(Dm100Register::PackCfg)
            .write(&NullWriter, 0x41)
            .await
            .unwrap();
        regs.get_mut(Dm100Register::MaskCfg)
            .write(&NullWriter, 0x80)
            .await
            .unwrap();
        regs.get_mut(Dm100Register::ModeCfg)
            .write(&NullWriter, 0x40)
            .await
            .unwrap();

        assert_eq!(
            EventLayout::from_registers(&regs).unwrap(),
            EventLayout {
                mode: AcquisitionMode::Waveform as u16,
                header: false,
                time: true,
                lost: true,
                checksum: false,
            }
        );
    }

    #[test]
    fn sample_mode_takes_first_sample() {
        let ev = decode_event(&layout(AcquisitionMode::Sample), &[1, 0x0123]).unwrap();
        assert_eq!(ev.value, 0x0123);
        assert!(ev.waveform.is_none());
        assert!(ev.timestamp.is_none());
    }

    #[test]
    fn tot_mode_reports_time_over_threshold() {
        let ev = decode_event(&layout(AcquisitionMode::SampleTot), &[2, 500, 17]).unwrap();
        assert_eq!(ev.value, 500);
        assert_eq!(ev.time_over_threshold, Some(17));
    }

    #[test]
    fn waveform_mode_takes_peak() {
        let ev = decode_event(&layout(AcquisitionMode::Waveform), &[4, 10, 900, 300, 20]).unwrap();
        assert_eq!(ev.value, 900);
        assert_eq!(ev.waveform, Some(vec![10, 900, 300, 20]));
    }

    #[test]
    fn full_layout_with_valid_checksum() {
        let lay = EventLayout {
            mode: AcquisitionMode::Sample as u16,
            header: true,
            time: true,
            lost: true,
            checksum: true,
        };
        let mut words = vec![0xA5A5, 0x0700, 1, 0x0042, 0x0001, 0x0002, 0x0003, 5];
        let sum = words.iter().fold(0u16, |a, &w| a.wrapping_add(w));
        words.push(sum);

        let ev = decode_event(&lay, &words).unwrap();
        assert_eq!(ev.value, 0x42);
        let header = ev.header.unwrap();
        assert_eq!(header.word0, 0xA5A5);
        assert_eq!(header.packet_id, 7);
        assert_eq!(ev.timestamp, Some(0x0001_0002_0003));
        assert_eq!(ev.lost, Some(5));
        assert_eq!(ev.checksum_valid, Some(true));
    }

    #[test]
    fn corrupted_word_fails_checksum() {
        let lay = EventLayout {
            checksum: true,
            ..layout(AcquisitionMode::Sample)
        };
        // sum(1, 0x10) = 0x11, but the sample arrived as 0x12.
        let ev = decode_event(&lay, &[1, 0x12, 0x11]).unwrap();
        assert_eq!(ev.value, 0x12);
        assert_eq!(ev.checksum_valid, Some(false));
    }

    #[test]
    fn wrong_length_is_protocol_error() {
        let lay = layout(AcquisitionMode::Sample);
        assert!(matches!(decode_event(&lay, &[2, 1]), Err(Error::Protocol(_))));
        assert!(matches!(decode_event(&lay, &[0]), Err(Error::Protocol(_))));
    }

    #[test]
    fn diagnostics_decoding() {
        // fw 3.5, 125 MSPS; LTC, /5, 50 ohm, internal ref, 1.0 range, DC; 14 bits.
        let diag = decode_diagnostics(&[0x1D, 125, 0, 0], &[0xFC, 0x0D, 0, 0]).unwrap();
        assert_eq!(diag.fw_version, "3.5");
        assert_eq!(diag.msps, 125);
        assert_eq!(diag.resolution_bits, 14);
        assert_eq!(diag.op_amp, OpAmp::Ltc);
        assert_eq!(diag.divider, 5);
        assert_eq!(diag.termination_ohms, 50);
        assert!(!diag.external_reference);
        assert_eq!(diag.iref_range, 1.0);
        assert!(diag.dc_coupled);

        let diag = decode_diagnostics(&[0x08, 65, 0, 0], &[0x00, 0x0B, 0, 0]).unwrap();
        assert_eq!(diag.fw_version, "1.0");
        assert_eq!(diag.op_amp, OpAmp::Ada);
        assert_eq!(diag.divider, 1);
        assert_eq!(diag.termination_ohms, 1000);
        assert!(diag.external_reference);
        assert_eq!(diag.iref_range, 0.5);
        assert!(!diag.dc_coupled);
        assert_eq!(diag.resolution_bits, 12);
    }
}
