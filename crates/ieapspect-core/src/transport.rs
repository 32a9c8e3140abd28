//! Transport trait for spectrometer communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to a device. The
//! serial port and helper-process implementations live in
//! `ieapspect-transport`; `MockTransport` in `ieapspect-test-harness` drives
//! protocol engines in tests without hardware.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous, bidirectional byte stream to a device.
///
/// A transport is owned by exactly one IO task for its whole life. Reads
/// return whatever bytes are available; framing is the framer's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write all of `data` to the device.
    ///
    /// One call carries one whole command so that commands never interleave
    /// on the wire.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes read (at least one). Waits up to
    /// `timeout`; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing arrived and
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost) once
    /// the stream has ended.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
