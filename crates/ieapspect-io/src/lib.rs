//! Shared IO machinery for ieapspect device drivers.
//!
//! Every driver follows the same shape: one tokio task owns the transport,
//! writes commands on request, frames the inbound byte stream with a
//! device-specific decoder, and publishes packets into per-type FIFOs that
//! the driver's operations wait on.
//!
//! # Architecture
//!
//! - [`framing`] -- the [`PacketDecoder`] contract and generic framers
//! - [`demux`] -- per-type packet queues with termination reporting
//! - [`reader`] -- exact-length reads over an untyped stream
//! - [`io`] -- IO task types, spawn, and the select loop

pub mod demux;
pub mod framing;
pub mod io;
pub mod reader;

pub use demux::{DemuxQueues, QueueGuard, Termination};
pub use framing::{DecodeResult, FixedDecoder, Packet, PacketDecoder, RAW_KIND, RawDecoder};
pub use io::{IoConfig, SessionIo, spawn_io_task};
pub use reader::ByteReader;
