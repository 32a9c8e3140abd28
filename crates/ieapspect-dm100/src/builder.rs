//! Dm100Builder -- fluent builder for [`Dm100`] sessions.
//!
//! # Example
//!
//! ```no_run
//! use ieapspect_dm100::Dm100Builder;
//!
//! # async fn example() -> ieapspect_core::Result<()> {
//! let dm = Dm100Builder::new()
//!     .program("/opt/ieapspect/bin/ieapspect-wrapper-dm100")
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use ieapspect_core::error::Result;
use ieapspect_core::transport::Transport;
use ieapspect_io::IoConfig;
use ieapspect_transport::ProcessTransport;

use crate::device::{Dm100, SessionOptions};

/// Helper program looked up on `PATH` when none is configured.
pub const DEFAULT_PROGRAM: &str = "ieapspect-wrapper-dm100";

/// Fluent builder for [`Dm100`].
pub struct Dm100Builder {
    program: String,
    args: Vec<String>,
    handshake_timeout: Duration,
    settle_delay: Duration,
    program_defaults: bool,
    io_config: IoConfig,
}

impl Dm100Builder {
    pub fn new() -> Self {
        Dm100Builder {
            program: DEFAULT_PROGRAM.to_string(),
            args: Vec::new(),
            handshake_timeout: Duration::from_secs(2),
            settle_delay: Duration::from_millis(100),
            program_defaults: true,
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

    /// Deadline for the diagnostic reads.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Pause after the diagnostic reads before the helper is checked for
    /// liveness.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Whether connect programs the default register set (on by default).
    pub fn program_defaults(mut self, enabled: bool) -> Self {
        self.program_defaults = enabled;
        self
    }

    pub fn io_config(mut self, config: IoConfig) -> Self {
        self.io_config = config;
        self
    }

    /// Connect over an already open transport.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Dm100> {
        let opts = SessionOptions {
            handshake_timeout: self.handshake_timeout,
            settle_delay: self.settle_delay,
            program_defaults: self.program_defaults,
            io_config: self.io_config,
        };
        Dm100::connect(transport, opts).await
    }

    /// Spawn the helper program and connect through it.
    pub async fn build(self) -> Result<Dm100> {
        let transport = ProcessTransport::spawn(&self.program, &self.args)?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for Dm100Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ieapspect_core::Error;

    #[test]
    fn builder_defaults() {
        let b = Dm100Builder::new();
        assert_eq!(b.program, "ieapspect-wrapper-dm100");
        assert!(b.args.is_empty());
        assert_eq!(b.settle_delay, Duration::from_millis(100));
        assert!(b.program_defaults);
    }

    #[test]
    fn builder_fluent_chain() {
        let b = Dm100Builder::new()
            .program("/usr/local/bin/dm100")
            .arg("--device")
            .arg("0")
            .program_defaults(false);
        assert_eq!(b.program, "/usr/local/bin/dm100");
        assert_eq!(b.args, vec!["--device", "0"]);
        assert!(!b.program_defaults);
    }

    #[tokio::test]
    async fn missing_helper_fails() {
        let result = Dm100Builder::new()
            .program("/nonexistent/ieapspect-wrapper-dm100")
            .build()
            .await;
        assert!(matches!(result, Err(Error::Transport(_)) | Err(Error::Io(_))));
    }
}
