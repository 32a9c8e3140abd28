//! SIPOS device façade.

use async_trait::async_trait;
use tracing::{debug, info};

use ieapspect_core::error::{Error, Result};
use ieapspect_core::event::Event;
use ieapspect_core::spectrometer::{SessionState, Spectrometer, SpectrometerInfo, StateCell};
use ieapspect_core::transport::Transport;
use ieapspect_io::{IoConfig, SessionIo, spawn_io_task};

use crate::protocol::{self, EVENT_KIND};

pub const DRIVER_NAME: &str = "SIPOS";
pub const CHANNELS: u32 = 4096;

/// A connected SIPOS photodiode spectrometer.
///
/// The device acquires continuously from power-up and takes no commands,
/// so [`start`](Spectrometer::start) and [`end`](Spectrometer::end) only
/// check that the session is open.
pub struct Sipos {
    io: SessionIo,
    info: SpectrometerInfo,
    state: StateCell,
}

impl Sipos {
    pub(crate) fn connect(transport: Box<dyn Transport>, io_config: IoConfig) -> Self {
        let io = spawn_io_task(transport, protocol::decoder(), io_config);
        info!("SIPOS connected");
        Sipos {
            io,
            info: SpectrometerInfo {
                driver: DRIVER_NAME,
                channels: CHANNELS,
                fw_version: String::new(),
                serial_number: None,
            },
            state: StateCell::new(SessionState::Running),
        }
    }

    /// Drop every event received so far. Returns how many were dropped.
    pub fn flush(&self) -> usize {
        self.io.queues().drain(EVENT_KIND)
    }
}

#[async_trait]
impl Spectrometer for Sipos {
    fn info(&self) -> &SpectrometerInfo {
        &self.info
    }

    fn state(&self) -> SessionState {
        match self.state.get() {
            SessionState::Running if !self.io.is_running() => SessionState::Closed,
            state => state,
        }
    }

    async fn start(&self) -> Result<()> {
        self.state.ensure_running()
    }

    async fn end(&self) -> Result<()> {
        self.state.ensure_running()
    }

    async fn next_event(&self) -> Result<Event> {
        self.state.ensure_running()?;
        let packet = self.io.queues().recv(EVENT_KIND).await?;
        match packet.bytes()[..] {
            [a, b] => Ok(Event::new(protocol::decode_value(a, b))),
            _ => Err(Error::Protocol(format!("event of {} bytes", packet.len()))),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.state.close() != SessionState::Running {
            return Ok(());
        }
        self.io.close().await?;
        debug!("SIPOS closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SiposBuilder;
    use ieapspect_test_harness::{MockHandle, MockTransport};
    use std::time::Duration;

    async fn connect() -> (Sipos, MockHandle) {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let spect = SiposBuilder::new()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        (spect, handle)
    }

    #[tokio::test]
    async fn events_are_byte_pairs() {
        let (spect, handle) = connect().await;
        assert_eq!(spect.state(), SessionState::Running);
        assert_eq!(spect.info().driver, "SIPOS");

        handle.push_inbound(&[0x3f, 0x3f, 0x00]);
        handle.push_inbound(&[0x00]);
        assert_eq!(spect.next_event().await.unwrap(), Event::new(0));
        assert_eq!(spect.next_event().await.unwrap(), Event::new(0xfff));
    }

    #[tokio::test]
    async fn start_and_end_send_nothing() {
        let (spect, handle) = connect().await;
        spect.start().await.unwrap();
        spect.end().await.unwrap();
        assert!(handle.sent_data().is_empty());
    }

    #[tokio::test]
    async fn properties_are_unsupported() {
        let (spect, _handle) = connect().await;
        assert!(spect.properties().is_empty());
        assert!(matches!(spect.get_prop(1).await, Err(Error::Unsupported(_))));
        assert!(matches!(spect.set_prop(1, 0).await, Err(Error::Unsupported(_))));
    }

    #[tokio::test]
    async fn flush_drops_queued_events() {
        let (spect, handle) = connect().await;
        handle.push_inbound(&[0x00, 0x00, 0x00, 0x00]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(spect.flush(), 2);
        let result = spect.next_event_timeout(Duration::from_millis(30)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn lost_port_ends_session() {
        let (spect, handle) = connect().await;
        handle.disconnect();
        assert!(matches!(spect.next_event().await, Err(Error::ConnectionLost)));
        assert_eq!(spect.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn close_rejects_further_use() {
        let (spect, _handle) = connect().await;
        spect.close().await.unwrap();
        assert_eq!(spect.state(), SessionState::Closed);
        assert!(matches!(spect.next_event().await, Err(Error::NotConnected)));
        assert!(matches!(spect.start().await, Err(Error::NotConnected)));
        spect.close().await.unwrap();
    }
}
