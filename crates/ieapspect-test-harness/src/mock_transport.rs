//! Mock transport for deterministic testing of protocol engines.
//!
//! Protocol engines take ownership of their transport and move it into an
//! IO task, so the mock keeps its state behind an `Arc`. Tests keep a
//! [`MockHandle`] to inject inbound bytes, inspect what was sent, and pull
//! the plug.
//!
//! # Example
//!
//! ```
//! use ieapspect_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // GET firmware version -> GET-RESPONSE 1.2
//! mock.expect(&[0x03, 0x01], &[0x83, 0x01, 0x02, 0x01]);
//! let handle = mock.handle();
//! handle.push_inbound(&[0x87, 0xC8, 0x00]);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use ieapspect_core::error::{Error, Result};
use ieapspect_core::transport::Transport;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// A pre-loaded request/response pair.
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

struct State {
    expectations: VecDeque<Expectation>,
    responder: Option<Responder>,
    inbound: VecDeque<u8>,
    sent_log: Vec<Vec<u8>>,
    connected: bool,
    eof: bool,
}

struct Shared {
    state: Mutex<State>,
    readable: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A mock [`Transport`] for testing protocol engines without hardware.
///
/// On `send()` the data is recorded, then:
/// - if an expectation is queued it must match exactly, and its response
///   becomes readable;
/// - otherwise the responder (if any) may produce a response;
/// - otherwise the send is simply accepted.
///
/// `receive()` returns queued inbound bytes, waits up to its timeout for
/// more, and reports [`Error::ConnectionLost`] once
/// [`MockHandle::disconnect`] was called and the queue is drained.
pub struct MockTransport {
    shared: Arc<Shared>,
}

/// Test-side handle onto a [`MockTransport`] that has been moved away.
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    expectations: VecDeque::new(),
                    responder: None,
                    inbound: VecDeque::new(),
                    sent_log: Vec::new(),
                    connected: true,
                    eof: false,
                }),
                readable: Notify::new(),
            }),
        }
    }

    /// A handle that stays usable after the transport is moved away.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.shared.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Answer sends that no expectation covers.
    ///
    /// The closure sees each sent chunk and returns the bytes the "device"
    /// replies with, if any.
    pub fn respond_with<F>(&mut self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.shared.lock().responder = Some(Box::new(responder));
    }

    /// Queue bytes the device sends without being asked.
    pub fn push_inbound(&self, data: &[u8]) {
        self.handle().push_inbound(data);
    }

    /// All data sent so far, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.handle().sent_data()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.shared.lock().connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Queue bytes the device sends without being asked.
    pub fn push_inbound(&self, data: &[u8]) {
        self.shared.lock().inbound.extend(data.iter().copied());
        self.shared.readable.notify_one();
    }

    /// All data sent so far, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent_log.clone()
    }

    /// All data sent so far, concatenated.
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.shared.lock().sent_log.concat()
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.shared.lock().expectations.len()
    }

    /// Forget everything sent so far.
    pub fn clear_sent(&self) {
        self.shared.lock().sent_log.clear();
    }

    /// Simulate the device going away: reads drain what is queued, then
    /// fail with [`Error::ConnectionLost`], as do all further sends.
    pub fn disconnect(&self) {
        self.shared.lock().eof = true;
        self.shared.readable.notify_one();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if state.eof {
            return Err(Error::ConnectionLost);
        }

        // Record what was sent.
        state.sent_log.push(data.to_vec());

        let response = if let Some(expectation) = state.expectations.pop_front() {
            if data != expectation.request.as_slice() {
                return Err(Error::Protocol(format!(
                    "unexpected send data: expected {:02X?}, got {:02X?}",
                    expectation.request, data
                )));
            }
            Some(expectation.response)
        } else if let Some(responder) = state.responder.as_mut() {
            responder(data)
        } else {
            None
        };

        if let Some(response) = response {
            state.inbound.extend(response);
            drop(state);
            self.shared.readable.notify_one();
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.shared.lock();
                if !state.connected {
                    return Err(Error::NotConnected);
                }
                if !state.inbound.is_empty() {
                    let n = state.inbound.len().min(buf.len());
                    for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
                if state.eof {
                    return Err(Error::ConnectionLost);
                }
            }
            if tokio::time::timeout_at(deadline, self.shared.readable.notified())
                .await
                .is_err()
            {
                return Err(Error::Timeout);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        state.connected = false;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let state = self.shared.lock();
        state.connected && !state.eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expectation_response_is_readable() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x03, 0x01], &[0x83, 0x01, 0x02, 0x01]);

        let handle = mock.handle();
        assert_eq!(handle.remaining_expectations(), 1);
        mock.send(&[0x03, 0x01]).await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[0x83, 0x01, 0x02, 0x01]);
        assert_eq!(handle.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn mismatched_request_is_protocol_error() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x03, 0x01], &[0x83, 0x01, 0x02, 0x01]);

        let result = mock.send(&[0x03, 0x06]).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn responder_answers_unscripted_sends() {
        let mut mock = MockTransport::new();
        mock.respond_with(|sent| (sent == [0x02]).then(|| vec![0x82]));

        mock.send(&[0x01]).await.unwrap();
        mock.send(&[0x02]).await.unwrap();

        let mut buf = [0u8; 8];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[0x82]);
        assert_eq!(mock.sent_data(), vec![vec![0x01], vec![0x02]]);
    }

    #[tokio::test]
    async fn receive_times_out_when_idle() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn pushed_bytes_wake_a_waiting_reader() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let n = mock.receive(&mut buf, Duration::from_secs(2)).await.unwrap();
            buf[..n].to_vec()
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.push_inbound(&[0x87, 0xC8, 0x00]);
        assert_eq!(reader.await.unwrap(), vec![0x87, 0xC8, 0x00]);
    }

    #[tokio::test]
    async fn short_buffer_reads_in_pieces() {
        let mut mock = MockTransport::new();
        mock.push_inbound(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 2];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2]);
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[3, 4]);
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], &[5]);
    }

    #[tokio::test]
    async fn disconnect_drains_then_fails() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        handle.push_inbound(&[0xAA]);
        handle.disconnect();

        let mut buf = [0u8; 8];
        assert_eq!(
            mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap(),
            1
        );
        assert!(matches!(
            mock.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::ConnectionLost)
        ));
        assert!(matches!(mock.send(&[0x01]).await, Err(Error::ConnectionLost)));
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn closed_mock_is_not_connected() {
        let mut mock = MockTransport::new();
        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(matches!(mock.send(&[0x01]).await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn handle_tracks_sent_bytes() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.send(&[0x04, 0x02]).await.unwrap();
        mock.send(&[0xE8, 0x03]).await.unwrap();

        assert_eq!(handle.sent_bytes(), vec![0x04, 0x02, 0xE8, 0x03]);
        handle.clear_sent();
        assert!(handle.sent_data().is_empty());
    }
}
