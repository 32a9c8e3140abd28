//! SpectrigBuilder -- fluent builder for [`Spectrig`] sessions.

use std::time::Duration;

use ieapspect_core::error::Result;
use ieapspect_core::transport::Transport;
use ieapspect_io::IoConfig;
use ieapspect_transport::ProcessTransport;

use crate::device::{SessionOptions, Spectrig};

/// Helper program looked up on `PATH` when none is configured.
pub const DEFAULT_PROGRAM: &str = "ieapspect-wrapper-spectrig";

/// Fluent builder for [`Spectrig`].
pub struct SpectrigBuilder {
    program: String,
    args: Vec<String>,
    handshake_timeout: Duration,
    settle_delay: Duration,
    verify_checksum: bool,
    io_config: IoConfig,
}

impl SpectrigBuilder {
    pub fn new() -> Self {
        SpectrigBuilder {
            program: DEFAULT_PROGRAM.to_string(),
            args: Vec::new(),
            handshake_timeout: Duration::from_secs(2),
            settle_delay: Duration::from_millis(100),
            verify_checksum: true,
            io_config: IoConfig::default(),
        }
    }

    /// Path of the helper program.
    pub fn program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Append an argument for the helper program.
    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Pause after the setup commands before the helper is checked for
    /// liveness.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Check each frame's checksum byte (on by default). When off, events
    /// carry no checksum verdict.
    pub fn verify_checksum(mut self, enabled: bool) -> Self {
        self.verify_checksum = enabled;
        self
    }

    pub fn io_config(mut self, config: IoConfig) -> Self {
        self.io_config = config;
        self
    }

    /// Connect over an already open transport.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Spectrig> {
        let opts = SessionOptions {
            handshake_timeout: self.handshake_timeout,
            settle_delay: self.settle_delay,
            verify_checksum: self.verify_checksum,
            io_config: self.io_config,
        };
        Spectrig::connect(transport, opts).await
    }

    /// Spawn the helper program and connect through it.
    pub async fn build(self) -> Result<Spectrig> {
        let transport = ProcessTransport::spawn(&self.program, &self.args)?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for SpectrigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let b = SpectrigBuilder::new();
        assert_eq!(b.program, "ieapspect-wrapper-spectrig");
        assert!(b.verify_checksum);
        assert_eq!(b.handshake_timeout, Duration::from_secs(2));
    }

    #[test]
    fn builder_fluent_chain() {
        let b = SpectrigBuilder::new()
            .program("./spectrig-helper")
            .arg("-v")
            .verify_checksum(false)
            .settle_delay(Duration::from_millis(250));
        assert_eq!(b.program, "./spectrig-helper");
        assert_eq!(b.args, vec!["-v"]);
        assert!(!b.verify_checksum);
        assert_eq!(b.settle_delay, Duration::from_millis(250));
    }
}
