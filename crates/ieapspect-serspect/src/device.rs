//! SerSpect device façade.
//!
//! [`SerSpect`] owns the session IO task and implements [`Spectrometer`].
//! Property reads are request/response exchanges serialized by one lock per
//! session; events, pongs and waveforms are each read from their own
//! demultiplexer queue, so acquisition and configuration can run from
//! different tasks.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ieapspect_core::error::{Error, Result};
use ieapspect_core::event::Event;
use ieapspect_core::property::{self, PropertyDescriptor};
use ieapspect_core::spectrometer::{SessionState, Spectrometer, SpectrometerInfo, StateCell};
use ieapspect_core::transport::Transport;
use ieapspect_io::{IoConfig, Packet, QueueGuard, SessionIo, spawn_io_task};

use crate::protocol::{self, DeviceError, SerSpectDecoder, packet, prop};

pub const DRIVER_NAME: &str = "SerSpect";
pub const CHANNELS: u32 = 4096;

/// Cap on bytes discarded while flushing before the handshake, so a board
/// left acquiring cannot stall the connect.
const MAX_FLUSH_BYTES: usize = 64 * 1024;

/// Session tunables, filled in by [`SerSpectBuilder`](crate::SerSpectBuilder).
#[derive(Debug, Clone)]
pub(crate) struct SessionOptions {
    pub handshake_timeout: Duration,
    pub response_timeout: Option<Duration>,
    pub flush_window: Duration,
    pub io_config: IoConfig,
}

/// A connected SerSpect acquisition board.
pub struct SerSpect {
    io: SessionIo,
    info: SpectrometerInfo,
    state: StateCell,
    prop_lock: Mutex<()>,
    response_timeout: Option<Duration>,
}

impl SerSpect {
    /// Run the connect sequence over `transport`.
    pub(crate) async fn connect(
        mut transport: Box<dyn Transport>,
        opts: SessionOptions,
    ) -> Result<Self> {
        let state = StateCell::new(SessionState::Initializing);

        transport
            .send(&protocol::encode_nop_burst())
            .await
            .map_err(|e| Error::Initialization(format!("NOP burst failed: {e}")))?;
        let flushed = flush(&mut *transport, opts.flush_window)
            .await
            .map_err(|e| Error::Initialization(format!("flush failed: {e}")))?;
        debug!(bytes = flushed, "flushed stale input");

        let io = spawn_io_task(transport, SerSpectDecoder, opts.io_config);
        let mut spect = SerSpect {
            io,
            info: SpectrometerInfo {
                driver: DRIVER_NAME,
                channels: CHANNELS,
                fw_version: String::new(),
                serial_number: None,
            },
            state,
            prop_lock: Mutex::new(()),
            response_timeout: opts.response_timeout,
        };

        let (fw, serial) = match tokio::time::timeout(opts.handshake_timeout, spect.handshake())
            .await
        {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                spect.abandon().await;
                return Err(Error::Initialization(e.to_string()));
            }
            Err(_) => {
                spect.abandon().await;
                return Err(Error::Initialization(format!(
                    "no handshake response within {:?}",
                    opts.handshake_timeout
                )));
            }
        };

        spect.info.fw_version = protocol::format_fw_version(fw);
        spect.info.serial_number = Some(serial);
        spect.state.set(SessionState::Running);
        info!(fw = %spect.info.fw_version, serial, "SerSpect connected");
        Ok(spect)
    }

    async fn handshake(&self) -> Result<(u32, u32)> {
        self.write_prop(prop::BIAS, 0).await?;
        self.write_prop(prop::AMP, 0).await?;
        let fw = self.read_prop(prop::FW_VERSION).await?;
        let serial = self.read_prop(prop::SERIAL_NUMBER).await?;
        Ok((fw, serial))
    }

    async fn abandon(&self) {
        self.state.close();
        if let Err(e) = self.io.close().await {
            debug!(error = %e, "close after failed handshake");
        }
    }

    async fn with_deadline<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or(Err(Error::Timeout)),
            None => fut.await,
        }
    }

    async fn write_prop(&self, id: u8, value: u32) -> Result<()> {
        let cmd = protocol::encode_set(id, value)?;
        self.io.send(cmd).await
    }

    /// Issue a request and wait for the packet of `reply_kind` that
    /// `accept` takes, failing on a device ERROR packet.
    ///
    /// Holds the session's property lock for the whole exchange.
    async fn exchange<T: Send>(
        &self,
        request: Vec<u8>,
        reply_kind: u8,
        mut accept: impl FnMut(&Packet) -> Result<Option<T>> + Send,
    ) -> Result<T> {
        let _exclusive = self.prop_lock.lock().await;
        let queues = self.io.queues();
        let mut replies = queues.lock(reply_kind).await;
        let mut errors = queues.lock(packet::ERROR).await;
        discard_stale(&mut replies, &mut errors);

        self.io.send(request).await?;

        let wait = async {
            loop {
                tokio::select! {
                    reply = replies.recv() => {
                        if let Some(value) = accept(&reply?)? {
                            return Ok::<T, Error>(value);
                        }
                    }
                    err = errors.recv() => {
                        let code = protocol::parse_error(&err?)?;
                        warn!(code, reason = %DeviceError::from(code), "device rejected request");
                        return Err(Error::Device { code });
                    }
                }
            }
        };
        self.with_deadline(wait).await
    }

    async fn read_prop(&self, id: u8) -> Result<u32> {
        let desc = property::require(&protocol::PROPERTIES, id)?;
        let value = self
            .exchange(protocol::encode_get(id), packet::GET_RESPONSE, |reply| {
                let (got, value) = protocol::parse_get_response(reply)?;
                if got == id {
                    Ok(Some(value))
                } else {
                    warn!(expected = id, got, "ignoring response for another property");
                    Ok(None)
                }
            })
            .await?;
        debug!(property = desc.name, value, "property read");
        Ok(value)
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> Result<()> {
        self.state.ensure_running()?;
        self.exchange(vec![packet::PING], packet::PONG, |_| Ok(Some(())))
            .await
    }

    /// Wait for the next WAVEFORM packet and return its samples.
    pub async fn next_waveform(&self) -> Result<Vec<u16>> {
        self.state.ensure_running()?;
        let packet = self.io.queues().recv(packet::WAVEFORM).await?;
        protocol::parse_waveform(&packet)
    }
}

/// Drop replies and errors left over from earlier exchanges.
fn discard_stale(replies: &mut QueueGuard<'_>, errors: &mut QueueGuard<'_>) {
    while let Some(stale) = replies.try_recv() {
        debug!(kind = stale.kind(), "discarding stale reply");
    }
    while let Some(stale) = errors.try_recv() {
        let code = stale.body().first().copied().unwrap_or(0);
        warn!(code, reason = %DeviceError::from(code), "discarding stale device error");
    }
}

/// Read and discard input until the line has been quiet for `window`.
async fn flush(transport: &mut dyn Transport, window: Duration) -> Result<usize> {
    let mut buf = [0u8; 256];
    let mut dropped = 0;
    while dropped < MAX_FLUSH_BYTES {
        match transport.receive(&mut buf, window).await {
            Ok(n) => dropped += n,
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(dropped)
}

#[async_trait]
impl Spectrometer for SerSpect {
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
        &protocol::CONFIG_PROPERTIES
    }

    async fn start(&self) -> Result<()> {
        self.state.ensure_running()?;
        self.io.send(vec![packet::START]).await
    }

    async fn end(&self) -> Result<()> {
        self.state.ensure_running()?;
        self.io.send(vec![packet::END]).await
    }

    async fn next_event(&self) -> Result<Event> {
        self.state.ensure_running()?;
        let packet = self.io.queues().recv(packet::EVENT).await?;
        Ok(Event::new(protocol::parse_event(&packet)?))
    }

    async fn get_prop(&self, id: u8) -> Result<u32> {
        self.state.ensure_running()?;
        self.read_prop(id).await
    }

    async fn set_prop(&self, id: u8, value: u32) -> Result<()> {
        self.state.ensure_running()?;
        self.write_prop(id, value).await
    }

    async fn close(&self) -> Result<()> {
        if self.state.close() != SessionState::Running {
            return Ok(());
        }
        if let Err(e) = self.io.send(vec![packet::END]).await {
            debug!(error = %e, "END on close failed");
        }
        self.io.close().await?;
        info!("SerSpect closed");
        Ok(())
    }
}
