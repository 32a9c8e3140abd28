//! SerSpectBuilder -- fluent builder for constructing [`SerSpect`] sessions.
//!
//! # Example
//!
//! ```no_run
//! use ieapspect_serspect::SerSpectBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> ieapspect_core::Result<()> {
//! let spect = SerSpectBuilder::new()
//!     .serial_port("/dev/ttyACM0")
//!     .response_timeout(Duration::from_secs(1))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use ieapspect_core::error::Result;
use ieapspect_core::transport::Transport;
use ieapspect_io::IoConfig;
use ieapspect_transport::{SerialTransport, find_port};

use crate::device::{SerSpect, SessionOptions};

/// USB product description the board enumerates with.
pub const USB_DESCRIPTION: &str = "Spectrometer Acquisition Board";

/// Nominal baud rate (the link is CDC-ACM).
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Fluent builder for [`SerSpect`].
///
/// Without an explicit serial port, [`build()`](Self::build) looks the
/// board up by its USB product description.
pub struct SerSpectBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    handshake_timeout: Duration,
    response_timeout: Option<Duration>,
    flush_window: Duration,
    io_config: IoConfig,
}

impl SerSpectBuilder {
    pub fn new() -> Self {
        SerSpectBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            handshake_timeout: Duration::from_secs(2),
            response_timeout: None,
            flush_window: Duration::from_millis(50),
            io_config: IoConfig::default(),
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyACM0`, `COM4`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Deadline for the whole connect handshake.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Deadline for each property read or ping. Unbounded by default.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// How long the line must stay quiet before the connect flush ends.
    pub fn flush_window(mut self, window: Duration) -> Self {
        self.flush_window = window;
        self
    }

    pub fn io_config(mut self, config: IoConfig) -> Self {
        self.io_config = config;
        self
    }

    /// Connect over an already open transport.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<SerSpect> {
        let opts = SessionOptions {
            handshake_timeout: self.handshake_timeout,
            response_timeout: self.response_timeout,
            flush_window: self.flush_window,
            io_config: self.io_config,
        };
        SerSpect::connect(transport, opts).await
    }

    /// Open the serial port (or find it by USB description) and connect.
    pub async fn build(self) -> Result<SerSpect> {
        let port = match &self.serial_port {
            Some(port) => port.clone(),
            None => find_port(USB_DESCRIPTION)?,
        };
        let transport = SerialTransport::open(&port, self.baud_rate).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for SerSpectBuilder {
    fn default() -> Self {
        Self::new()
    }
}
