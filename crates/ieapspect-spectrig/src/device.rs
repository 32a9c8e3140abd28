//! Spectrig device façade.
//!
//! The digitizer never answers commands in a way the host can correlate,
//! so every setting is write-only and [`Spectrig`] keeps the last value it
//! wrote for each one. Only spectro frames reach the event queue.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use ieapspect_core::error::{Error, Result};
use ieapspect_core::event::Event;
use ieapspect_core::property::{self, PropertyDescriptor};
use ieapspect_core::spectrometer::{SessionState, Spectrometer, SpectrometerInfo, StateCell};
use ieapspect_core::transport::Transport;
use ieapspect_io::{IoConfig, SessionIo, spawn_io_task};

use crate::protocol::{self, PROPERTIES, SpectrigDecoder, TriggerSource, cmd, frame};

pub const DRIVER_NAME: &str = "Spectrig";
pub const CHANNELS: u32 = 4096;

/// Session tunables, filled in by [`SpectrigBuilder`](crate::SpectrigBuilder).
#[derive(Debug, Clone)]
pub(crate) struct SessionOptions {
    pub handshake_timeout: Duration,
    pub settle_delay: Duration,
    pub verify_checksum: bool,
    pub io_config: IoConfig,
}

/// A connected Spectrig digitizer.
pub struct Spectrig {
    io: SessionIo,
    info: SpectrometerInfo,
    state: StateCell,
    verify_checksum: bool,
    settings: Mutex<HashMap<u8, u32>>,
}

impl Spectrig {
    /// Run the connect sequence over `transport`.
    pub(crate) async fn connect(transport: Box<dyn Transport>, opts: SessionOptions) -> Result<Self> {
        let io = spawn_io_task(transport, SpectrigDecoder, opts.io_config);
        let spect = Spectrig {
            io,
            info: SpectrometerInfo {
                driver: DRIVER_NAME,
                channels: CHANNELS,
                fw_version: String::new(),
                serial_number: None,
            },
            state: StateCell::new(SessionState::Initializing),
            verify_checksum: opts.verify_checksum,
            settings: Mutex::new(HashMap::new()),
        };

        let handshake = async {
            spect.command(cmd::ENABLE, [0, 0, 0]).await?;
            spect
                .command(cmd::SET_TRIG_SRC, [0, 0, TriggerSource::Threshold as u8])
                .await
        };
        let failure = match tokio::time::timeout(opts.handshake_timeout, handshake).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("helper not accepting commands within {:?}", opts.handshake_timeout)),
        };
        if let Some(reason) = failure {
            spect.abandon().await;
            return Err(Error::Initialization(reason));
        }

        // The helper has no handshake of its own; give it time to fail.
        tokio::time::sleep(opts.settle_delay).await;
        if !spect.io.is_running() {
            spect.abandon().await;
            return Err(Error::Initialization("helper process exited".into()));
        }

        spect.state.set(SessionState::Running);
        info!(verify_checksum = spect.verify_checksum, "Spectrig connected");
        Ok(spect)
    }

    async fn abandon(&self) {
        self.state.close();
        if let Err(e) = self.io.close().await {
            debug!(error = %e, "close after failed handshake");
        }
    }

    /// Send one command frame.
    pub async fn command(&self, command: u8, params: [u8; 3]) -> Result<()> {
        self.io.send(protocol::encode_command(command, params).to_vec()).await
    }

    /// Fire a software trigger.
    pub async fn sw_trigger(&self) -> Result<()> {
        self.state.ensure_running()?;
        self.command(cmd::SW_TRIGGER, [0, 0, 0]).await
    }

    pub async fn set_trigger_source(&self, source: TriggerSource) -> Result<()> {
        self.state.ensure_running()?;
        self.command(cmd::SET_TRIG_SRC, [0, 0, source as u8]).await
    }
}

#[async_trait]
impl Spectrometer for Spectrig {
    fn info(&self) -> &SpectrometerInfo {
        &self.info
    }

    fn state(&self) -> SessionState {
        match self.state.get() {
            SessionState::Running if !self.io.is_running() => SessionState::Closed,
            state => state,
        }
    }

    fn properties(&self) -> &[PropertyDescriptor] {
        &PROPERTIES
    }

    async fn start(&self) -> Result<()> {
        self.state.ensure_running()?;
        self.command(cmd::ENABLE, [0, 0, 1]).await
    }

    async fn end(&self) -> Result<()> {
        self.state.ensure_running()?;
        self.command(cmd::ENABLE, [0, 0, 0]).await
    }

    async fn next_event(&self) -> Result<Event> {
        self.state.ensure_running()?;
        let packet = self.io.queues().recv(frame::SPECTRO).await?;
        protocol::parse_frame(packet.bytes(), self.verify_checksum)
    }

    /// Last value written, or 0 if the setting was never written.
    async fn get_prop(&self, id: u8) -> Result<u32> {
        self.state.ensure_running()?;
        property::require(&PROPERTIES, id)?;
        Ok(self.settings.lock().await.get(&id).copied().unwrap_or(0))
    }

    async fn set_prop(&self, id: u8, value: u32) -> Result<()> {
        self.state.ensure_running()?;
        let desc = property::require(&PROPERTIES, id)?;
        desc.validate(value)?;
        let mut settings = self.settings.lock().await;
        self.command(id, protocol::value_params(value as u16)).await?;
        settings.insert(id, value);
        debug!(property = desc.name, value, "setting written");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.state.close() != SessionState::Running {
            return Ok(());
        }
        if let Err(e) = self.command(cmd::ENABLE, [0, 0, 0]).await {
            debug!(error = %e, "disable on close failed");
        }
        self.io.close().await?;
        info!("Spectrig closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SpectrigBuilder;
    use crate::protocol::test_frame;
    use ieapspect_test_harness::{MockHandle, MockTransport};
    use std::sync::Arc;

    async fn connect() -> (Spectrig, MockHandle) {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let spect = SpectrigBuilder::new()
            .settle_delay(Duration::from_millis(5))
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        (spect, handle)
    }

    #[tokio::test]
    async fn connect_disables_measurement_and_selects_threshold_trigger() {
        let (spect, handle) = connect().await;
        assert_eq!(spect.state(), SessionState::Running);
        assert_eq!(spect.info().driver, "Spectrig");
        assert_eq!(spect.info().channels, 4096);
        assert_eq!(
            handle.sent_data(),
            vec![
                vec![0x55, 0xa2, 0x00, 0x00, 0x00, 0xa2],
                vec![0x55, 0xa4, 0x00, 0x00, 0x01, 0xa5],
            ]
        );
    }

    #[tokio::test]
    async fn spectro_frames_become_events() {
        let (spect, handle) = connect().await;
        handle.push_inbound(&test_frame(frame::CMD_ECHO, &[], 0));
        handle.push_inbound(&test_frame(frame::SPECTRO, &[10, 4000, 30], 77));

        let event = spect.next_event().await.unwrap();
        assert_eq!(event.value, 4000);
        assert_eq!(event.waveform, Some(vec![10, 4000, 30]));
        assert_eq!(event.timestamp, Some(77));
        assert_eq!(event.checksum_valid, Some(true));
    }

    #[tokio::test]
    async fn stream_recovers_from_lost_byte() {
        let (spect, handle) = connect().await;
        let mut broken = test_frame(frame::SPECTRO, &[1, 2, 3], 1);
        broken.remove(100);
        handle.push_inbound(&broken);
        handle.push_inbound(&test_frame(frame::SPECTRO, &[55], 2));

        let event = spect.next_event().await.unwrap();
        assert_eq!(event.value, 55);
        assert_eq!(event.timestamp, Some(2));
    }

    #[tokio::test]
    async fn checksum_verification_can_be_disabled() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let spect = SpectrigBuilder::new()
            .settle_delay(Duration::from_millis(5))
            .verify_checksum(false)
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        handle.push_inbound(&test_frame(frame::SPECTRO, &[9], 0));
        assert_eq!(spect.next_event().await.unwrap().checksum_valid, None);
    }

    #[tokio::test]
    async fn settings_are_cached() {
        let (spect, handle) = connect().await;
        handle.clear_sent();

        assert_eq!(spect.get_prop(cmd::SET_SAMPLE_COUNT).await.unwrap(), 0);
        spect.set_prop(cmd::SET_THRESHOLD, 0x0123).await.unwrap();
        assert_eq!(
            handle.sent_data(),
            vec![vec![0x55, 0x10, 0x00, 0x01, 0x23, 0x32]]
        );
        assert_eq!(spect.get_prop(cmd::SET_THRESHOLD).await.unwrap(), 0x0123);
    }

    #[tokio::test]
    async fn unknown_setting_is_rejected() {
        let (spect, handle) = connect().await;
        handle.clear_sent();

        let result = spect.set_prop(cmd::ENABLE, 1).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        let result = spect.set_prop(cmd::SET_PRETRIG, 0x10000).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(handle.sent_data().is_empty());
    }

    #[tokio::test]
    async fn acquisition_commands() {
        let (spect, handle) = connect().await;
        handle.clear_sent();

        spect.start().await.unwrap();
        spect.sw_trigger().await.unwrap();
        spect.set_trigger_source(TriggerSource::External).await.unwrap();
        spect.end().await.unwrap();
        assert_eq!(
            handle.sent_data(),
            vec![
                vec![0x55, 0xa2, 0x00, 0x00, 0x01, 0xa3],
                vec![0x55, 0xa5, 0x00, 0x00, 0x00, 0xa5],
                vec![0x55, 0xa4, 0x00, 0x00, 0x03, 0xa7],
                vec![0x55, 0xa2, 0x00, 0x00, 0x00, 0xa2],
            ]
        );
    }

    #[tokio::test]
    async fn exited_helper_fails_initialization() {
        let mock = MockTransport::new();
        mock.handle().disconnect();
        let result = SpectrigBuilder::new()
            .settle_delay(Duration::from_millis(20))
            .build_with_transport(Box::new(mock))
            .await;
        assert!(matches!(result, Err(Error::Initialization(_))));
    }

    #[tokio::test]
    async fn close_disables_and_rejects_further_use() {
        let (spect, handle) = connect().await;
        handle.clear_sent();

        spect.close().await.unwrap();
        assert_eq!(spect.state(), SessionState::Closed);
        assert_eq!(
            handle.sent_data(),
            vec![vec![0x55, 0xa2, 0x00, 0x00, 0x00, 0xa2]]
        );
        assert!(matches!(spect.start().await, Err(Error::NotConnected)));
        assert!(matches!(spect.get_prop(cmd::SET_THRESHOLD).await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn pending_event_wait_fails_on_close() {
        let (spect, _handle) = connect().await;
        let spect = Arc::new(spect);

        let waiter = {
            let spect = Arc::clone(&spect);
            tokio::spawn(async move { spect.next_event().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        spect.close().await.unwrap();

        assert!(matches!(waiter.await.unwrap(), Err(Error::NotConnected)));
    }
}
