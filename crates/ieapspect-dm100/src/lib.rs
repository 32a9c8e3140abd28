//! ieapspect-dm100 -- driver for the DM100 digitizer.
//!
//! The digitizer sits behind a vendor helper program; this crate talks to
//! the helper over its stdin/stdout. Configuration lives in write-only
//! registers, mirrored on the host so bit fields can be updated with
//! read-modify-write and the event layout can be derived.

pub mod builder;
pub mod device;
pub mod protocol;
pub mod registers;

pub use builder::Dm100Builder;
pub use device::Dm100;
pub use protocol::{Diagnostics, OpAmp};
pub use registers::{AcquisitionMode, Dm100Register, EndMode, Field, StartMode, field};
