//! ieapspect-sipos -- driver for the SIPOS photodiode spectrometer.
//!
//! A free-running serial device: it streams two-byte events from power-up
//! and accepts no commands.

pub mod builder;
pub mod device;
pub mod protocol;

pub use builder::SiposBuilder;
pub use device::Sipos;
