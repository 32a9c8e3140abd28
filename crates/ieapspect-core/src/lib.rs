//! ieapspect-core: Core traits, types, and error definitions for ieapspect.
//!
//! This crate defines the device-agnostic abstractions every spectrometer
//! driver implements. Acquisition software depends on these types without
//! pulling in a specific driver.
//!
//! # Key types
//!
//! - [`Spectrometer`] -- the unified trait for any spectrometer
//! - [`Transport`] -- byte-level communication channel
//! - [`Event`] -- one detection
//! - [`PropertyDescriptor`] -- id, width and range of a device property
//! - [`Register`] / [`BitField`] -- host-cached write-only registers
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod event;
pub mod property;
pub mod register;
pub mod spectrometer;
pub mod transport;

// Re-export key types at crate root for ergonomic `use ieapspect_core::*`.
pub use error::{Error, Result};
pub use event::{Event, EventHeader};
pub use property::{PropertyDescriptor, decode_le, encode_le};
pub use register::{BitField, Register, RegisterAddress, RegisterWriter};
pub use spectrometer::{SessionState, Spectrometer, SpectrometerInfo, StateCell, events};
pub use transport::Transport;
