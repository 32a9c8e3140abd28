//! Transport implementations for ieapspect.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](ieapspect_core::Transport) trait from `ieapspect-core`:
//!
//! - [`SerialTransport`]: USB virtual COM ports of directly attached boards
//! - [`ProcessTransport`]: stdin/stdout of a vendor helper program
//!
//! [`find_port`] locates a board by its USB product description.

pub mod process;
pub mod serial;

pub use process::ProcessTransport;
pub use serial::{DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits, find_port};
