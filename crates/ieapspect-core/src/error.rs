//! Error types for ieapspect.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, device-reported
//! errors, handshake failures and caller mistakes are all captured here.
//! Framing corruption on the wire is recovered silently by the framers and
//! never shows up as an error.

/// The error type for all ieapspect operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, helper process).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (response that cannot be interpreted).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a response from the device.
    ///
    /// Only produced by operations that were given an explicit deadline.
    #[error("timeout waiting for response")]
    Timeout,

    /// The requested operation is not supported by this device.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed (unknown property, value out of range).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The session is not running (never connected, or closed by the host).
    #[error("not connected")]
    NotConnected,

    /// The transport failed underneath a running session.
    #[error("connection lost")]
    ConnectionLost,

    /// The device answered a request with an error packet.
    #[error("device reported error code {code}")]
    Device {
        /// Raw error code from the firmware.
        code: u8,
    },

    /// The connection handshake did not complete.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the session can make no further progress.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NotConnected | Error::ConnectionLost)
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_invalid_parameter() {
        let e = Error::InvalidParameter("threshold 5000 out of range".into());
        assert_eq!(e.to_string(), "invalid parameter: threshold 5000 out of range");
    }

    #[test]
    fn error_display_device() {
        let e = Error::Device { code: 2 };
        assert_eq!(e.to_string(), "device reported error code 2");
    }

    #[test]
    fn error_display_initialization() {
        let e = Error::Initialization("no firmware response".into());
        assert_eq!(e.to_string(), "initialization failed: no firmware response");
    }

    #[test]
    fn error_display_session_states() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn fatal_errors() {
        assert!(Error::NotConnected.is_fatal());
        assert!(Error::ConnectionLost.is_fatal());
        assert!(!Error::Timeout.is_fatal());
        assert!(!Error::Device { code: 1 }.is_fatal());
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
