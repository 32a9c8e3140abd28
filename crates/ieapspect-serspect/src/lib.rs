//! ieapspect-serspect: driver for the SerSpect acquisition board.
//!
//! The board streams typed packets over a USB virtual serial port. Events,
//! property responses, pongs, waveforms and error reports share the one
//! stream and are told apart by their leading type byte.
//!
//! # Architecture
//!
//! - [`protocol`] -- packet types, property table, framer and parsers
//! - [`builder`] -- [`SerSpectBuilder`] (port discovery, timeouts)
//! - [`device`] -- [`SerSpect`], the [`Spectrometer`](ieapspect_core::Spectrometer) façade

pub mod builder;
pub mod device;
pub mod protocol;

pub use builder::SerSpectBuilder;
pub use device::SerSpect;
pub use protocol::{DeviceError, prop};
