//! SiposBuilder -- fluent builder for [`Sipos`] sessions.

use ieapspect_core::error::Result;
use ieapspect_core::transport::Transport;
use ieapspect_io::IoConfig;
use ieapspect_transport::{SerialTransport, find_port};

use crate::device::Sipos;

/// USB product description the device enumerates with.
pub const USB_DESCRIPTION: &str = "Photodiode Spectrometer";

pub const DEFAULT_BAUD_RATE: u32 = 500_000;

/// Fluent builder for [`Sipos`].
///
/// Without an explicit serial port, [`build()`](Self::build) looks the
/// device up by its USB product description.
pub struct SiposBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    io_config: IoConfig,
}

impl SiposBuilder {
    pub fn new() -> Self {
        SiposBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            io_config: IoConfig::default(),
        }
    }

    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    pub fn io_config(mut self, config: IoConfig) -> Self {
        self.io_config = config;
        self
    }

    /// Start a session over an already open transport.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Sipos> {
        Ok(Sipos::connect(transport, self.io_config))
    }

    /// Open the serial port (or find it by USB description) and connect.
    pub async fn build(self) -> Result<Sipos> {
        let port = match &self.serial_port {
            Some(port) => port.clone(),
            None => find_port(USB_DESCRIPTION)?,
        };
        let transport = SerialTransport::open(&port, self.baud_rate).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for SiposBuilder {
    fn default() -> Self {
        Self::new()
    }
}
