//! Detection events produced by spectrometers.

/// Header words prepended to an event when the device is configured to
/// emit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// First raw header word.
    pub word0: u16,
    /// Second raw header word.
    pub word1: u16,
    /// Rolling packet counter carried in the header.
    pub packet_id: u8,
}

/// One detected particle or photon.
///
/// `value` is always present and lies in `0..channels` for the device that
/// produced it. Every other field is present only when the device (or its
/// current configuration) supplies it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    /// Pulse height (channel number).
    pub value: u32,
    /// Raw sample sequence the value was derived from.
    pub waveform: Option<Vec<u16>>,
    /// Device timestamp.
    pub timestamp: Option<u64>,
    /// Result of the device checksum check, if the frame carried one and
    /// verification was enabled.
    pub checksum_valid: Option<bool>,
    /// Time over threshold, in samples.
    pub time_over_threshold: Option<u16>,
    /// Optional header block.
    pub header: Option<EventHeader>,
    /// Count of events the device dropped before this one.
    pub lost: Option<u16>,
}

impl Event {
    /// Create an event carrying only a pulse height.
    pub fn new(value: u32) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    /// Create an event from a waveform; the value is its peak sample.
    pub fn from_waveform(waveform: Vec<u16>) -> Self {
        let value = waveform.iter().copied().max().unwrap_or(0) as u32;
        Self {
            value,
            waveform: Some(waveform),
            ..Default::default()
        }
    }

    /// Attach a timestamp.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
