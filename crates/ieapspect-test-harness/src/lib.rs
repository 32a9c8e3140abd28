//! ieapspect-test-harness: Mock transports for testing ieapspect protocol
//! engines without hardware.
//!
//! [`MockTransport`] scripts the device side of a session: exact
//! request/response pairs, an auto-responder closure, unsolicited inbound
//! bytes pushed from the test through a [`MockHandle`], and simulated
//! end-of-stream.

pub mod mock_transport;

pub use mock_transport::{MockHandle, MockTransport};
