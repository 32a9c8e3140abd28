//! The `Spectrometer` trait -- unified interface for all device drivers.
//!
//! Acquisition software programs against `dyn Spectrometer` without knowing
//! which device family sits on the other end. Each driver crate
//! (ieapspect-serspect, ieapspect-dm100, ...) provides a concrete façade
//! that implements this trait.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::property::PropertyDescriptor;

/// Static information about a connected device, gathered during the
/// handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrometerInfo {
    /// Driver name, e.g. `"SerSpect"`.
    pub driver: &'static str,
    /// Number of pulse-height channels; event values lie in `0..channels`.
    pub channels: u32,
    /// Firmware version as reported by the device, `"major.minor"`.
    pub fw_version: String,
    /// Device serial number, when the device reports one.
    pub serial_number: Option<u32>,
}

/// Lifecycle of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Initializing,
    Running,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Initializing => "initializing",
            SessionState::Running => "running",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Lock-free holder for a [`SessionState`], shared between a façade and its
/// callers.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> SessionState {
        match self.0.load(Ordering::Acquire) {
            0 => SessionState::Unconnected,
            1 => SessionState::Initializing,
            2 => SessionState::Running,
            _ => SessionState::Closed,
        }
    }

    pub fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `Closed`, returning the state that was replaced.
    pub fn close(&self) -> SessionState {
        let prev = self.0.swap(SessionState::Closed as u8, Ordering::AcqRel);
        match prev {
            0 => SessionState::Unconnected,
            1 => SessionState::Initializing,
            2 => SessionState::Running,
            _ => SessionState::Closed,
        }
    }

    /// `Ok(())` while running, [`Error::NotConnected`] otherwise.
    pub fn ensure_running(&self) -> Result<()> {
        if self.get() == SessionState::Running {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

/// Unified asynchronous interface to a spectrometer.
///
/// All methods take `&self`; drivers serialize access internally, so one
/// façade can be shared between an acquisition task and a control task.
/// Waits are unbounded unless a deadline is requested through
/// [`next_event_timeout`](Spectrometer::next_event_timeout) or the driver's
/// builder.
#[async_trait]
pub trait Spectrometer: Send + Sync {
    /// Return static information gathered during the handshake.
    fn info(&self) -> &SpectrometerInfo;

    /// Current session state.
    fn state(&self) -> SessionState;

    /// Configurable properties this device exposes.
    fn properties(&self) -> &[PropertyDescriptor] {
        &[]
    }

    /// Begin acquisition.
    async fn start(&self) -> Result<()>;

    /// Stop acquisition. The session stays open.
    async fn end(&self) -> Result<()>;

    /// Wait for the next detection event.
    async fn next_event(&self) -> Result<Event>;

    /// Wait for the next event, giving up after `timeout`.
    async fn next_event_timeout(&self, timeout: Duration) -> Result<Event> {
        match tokio::time::timeout(timeout, self.next_event()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Read a property value from the device (or its host-side cache).
    async fn get_prop(&self, id: u8) -> Result<u32> {
        let _ = id;
        Err(Error::Unsupported(format!(
            "{} has no readable properties",
            self.info().driver
        )))
    }

    /// Write a property value.
    async fn set_prop(&self, id: u8, value: u32) -> Result<()> {
        let _ = (id, value);
        Err(Error::Unsupported(format!(
            "{} has no writable properties",
            self.info().driver
        )))
    }

    /// Stop acquisition if needed and release the transport.
    async fn close(&self) -> Result<()>;
}

/// Lazy stream of events from `spect`.
///
/// Yields events until the session stops; a fatal error
/// ([`Error::is_fatal`]) is yielded once and then ends the stream. Other
/// errors are yielded and the stream keeps going.
pub fn events<S>(spect: &S) -> impl Stream<Item = Result<Event>> + Send + '_
where
    S: Spectrometer + ?Sized,
{
    stream::unfold(false, move |done| async move {
        if done {
            return None;
        }
        match spect.next_event().await {
            Ok(event) => Some((Ok(event), false)),
            Err(e) => {
                let fatal = e.is_fatal();
                Some((Err(e), fatal))
            }
        }
    })
}
