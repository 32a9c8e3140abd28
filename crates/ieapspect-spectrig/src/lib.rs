//! ieapspect-spectrig -- driver for the Spectrig framed-waveform digitizer.
//!
//! The digitizer is reached through a vendor helper program on
//! stdin/stdout. Each triggered acquisition arrives as one fixed-size
//! frame carrying up to 256 samples and a timestamp.

pub mod builder;
pub mod device;
pub mod protocol;

pub use builder::SpectrigBuilder;
pub use device::Spectrig;
pub use protocol::TriggerSource;
