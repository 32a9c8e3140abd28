//! # ieapspect -- async drivers for particle and radiation spectrometers
//!
//! `ieapspect` talks to pulse-height spectrometers over serial ports and
//! vendor helper processes and hands out detection events through one
//! device-independent trait.
//!
//! ## Quick start
//!
//! ```no_run
//! use ieapspect::Spectrometer;
//! use ieapspect::serspect::SerSpectBuilder;
//!
//! #[tokio::main]
//! async fn main() -> ieapspect::Result<()> {
//!     let spect = SerSpectBuilder::new().build().await?;
//!     spect.start().await?;
//!     for _ in 0..10 {
//!         let event = spect.next_event().await?;
//!         println!("channel {}", event.value);
//!     }
//!     spect.close().await
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                 | Purpose                                              |
//! |-----------------------|------------------------------------------------------|
//! | `ieapspect-core`      | [`Spectrometer`] trait, [`Event`], registers, errors |
//! | `ieapspect-io`        | Framers, per-type queues, the session IO task        |
//! | `ieapspect-transport` | Serial and helper-process transports                 |
//! | `ieapspect-serspect`  | SerSpect acquisition board                           |
//! | `ieapspect-sipos`     | SIPOS photodiode spectrometer                        |
//! | `ieapspect-dm100`     | DM100 digitizer                                      |
//! | `ieapspect-spectrig`  | Spectrig framed-waveform digitizer                   |
//! | **`ieapspect`**       | This facade, plus [`DummySpectrometer`] and [`connect`] |
//!
//! ## Feature flags
//!
//! | Feature    | Enables              | Default |
//! |------------|----------------------|---------|
//! | `serspect` | [`serspect`] module  | yes     |
//! | `sipos`    | [`sipos`] module     | yes     |
//! | `dm100`    | [`dm100`] module     | yes     |
//! | `spectrig` | [`spectrig`] module  | yes     |
//! | `full`     | All drivers          | no      |

pub use ieapspect_core::*;

pub mod connect;
pub mod dummy;

pub use connect::{ConnectOptions, DeviceKind, connect};
pub use dummy::DummySpectrometer;

/// Serial and helper-process transports.
pub mod transport {
    pub use ieapspect_transport::*;
}

/// SerSpect acquisition board: typed packets over USB serial.
#[cfg(feature = "serspect")]
pub mod serspect {
    pub use ieapspect_serspect::*;
}

/// SIPOS photodiode spectrometer: free-running two-byte events.
#[cfg(feature = "sipos")]
pub mod sipos {
    pub use ieapspect_sipos::*;
}

/// DM100 digitizer: register-configured, behind a helper process.
#[cfg(feature = "dm100")]
pub mod dm100 {
    pub use ieapspect_dm100::*;
}

/// Spectrig digitizer: fixed-size waveform frames, behind a helper process.
#[cfg(feature = "spectrig")]
pub mod spectrig {
    pub use ieapspect_spectrig::*;
}
