//! DM100 device façade.
//!
//! The digitizer is driven through a helper process that forwards two-byte
//! commands and returns the raw word stream. Nothing on the wire describes
//! itself, so the façade keeps a host-side [`RegisterFile`] and derives the
//! event layout from it before every read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use ieapspect_core::error::{Error, Result};
use ieapspect_core::event::Event;
use ieapspect_core::property::{self, PropertyDescriptor};
use ieapspect_core::register::RegisterWriter;
use ieapspect_core::spectrometer::{SessionState, Spectrometer, SpectrometerInfo, StateCell};
use ieapspect_core::transport::Transport;
use ieapspect_io::{ByteReader, IoConfig, RAW_KIND, RawDecoder, SessionIo, spawn_io_task};

use crate::protocol::{
    self, Diagnostics, EventLayout, MASK_FIRMWARE, MASK_FRONTEND, MASKED_READ_LEN,
};
use crate::registers::{AcquisitionMode, Dm100Register, Field, PROPERTIES, RegisterFile, cmd, field};

pub const DRIVER_NAME: &str = "DM100";
pub const CHANNELS: u32 = 65_536;

/// Session tunables, filled in by [`Dm100Builder`](crate::Dm100Builder).
#[derive(Debug, Clone)]
pub(crate) struct SessionOptions {
    pub handshake_timeout: Duration,
    pub settle_delay: Duration,
    pub program_defaults: bool,
    pub io_config: IoConfig,
}

/// Sends register commands through the session IO task.
struct CommandLink<'a>(&'a SessionIo);

#[async_trait]
impl RegisterWriter for CommandLink<'_> {
    async fn write_command(&self, command: u8, data: u8) -> Result<()> {
        self.0.send(protocol::encode_command(command, data).to_vec()).await
    }
}

/// A connected DM100 digitizer.
pub struct Dm100 {
    io: SessionIo,
    info: SpectrometerInfo,
    state: StateCell,
    diagnostics: Option<Diagnostics>,
    // Lock order: reader, then registers.
    reader: Mutex<ByteReader>,
    registers: Mutex<RegisterFile>,
}

impl Dm100 {
    /// Run the connect sequence over `transport`.
    pub(crate) async fn connect(transport: Box<dyn Transport>, opts: SessionOptions) -> Result<Self> {
        let io = spawn_io_task(transport, RawDecoder, opts.io_config);
        let reader = ByteReader::new(Arc::clone(io.queues()), RAW_KIND);
        let mut dm = Dm100 {
            io,
            info: SpectrometerInfo {
                driver: DRIVER_NAME,
                channels: CHANNELS,
                fw_version: String::new(),
                serial_number: None,
            },
            state: StateCell::new(SessionState::Initializing),
            diagnostics: None,
            reader: Mutex::new(reader),
            registers: Mutex::new(RegisterFile::new()),
        };

        let diagnostics = match tokio::time::timeout(opts.handshake_timeout, dm.handshake()).await {
            Ok(Ok(diagnostics)) => diagnostics,
            Ok(Err(e)) => {
                dm.abandon().await;
                return Err(Error::Initialization(e.to_string()));
            }
            Err(_) => {
                dm.abandon().await;
                return Err(Error::Initialization(format!(
                    "no diagnostic response within {:?}",
                    opts.handshake_timeout
                )));
            }
        };

        tokio::time::sleep(opts.settle_delay).await;
        if !dm.io.is_running() {
            dm.abandon().await;
            return Err(Error::Initialization("helper process exited".into()));
        }

        if opts.program_defaults {
            if let Err(e) = dm.program_defaults().await {
                dm.abandon().await;
                return Err(Error::Initialization(format!("programming defaults: {e}")));
            }
        }

        dm.info.fw_version = diagnostics.fw_version.clone();
        info!(
            fw = %diagnostics.fw_version,
            msps = diagnostics.msps,
            bits = diagnostics.resolution_bits,
            "DM100 connected"
        );
        dm.diagnostics = Some(diagnostics);
        dm.state.set(SessionState::Running);
        Ok(dm)
    }

    async fn handshake(&self) -> Result<Diagnostics> {
        let firmware = self.read_masked(MASK_FIRMWARE).await?;
        let frontend = self.read_masked(MASK_FRONTEND).await?;
        protocol::decode_diagnostics(&firmware, &frontend)
    }

    async fn abandon(&self) {
        self.state.close();
        if let Err(e) = self.io.close().await {
            debug!(error = %e, "close after failed handshake");
        }
    }

    /// Select `mask` in MASKCFG, pulse a trigger and read the four bytes the
    /// digitizer answers with.
    ///
    /// Leaves the digitizer inhibited.
    async fn read_masked(&self, mask: u16) -> Result<Vec<u8>> {
        let mut reader = self.reader.lock().await;
        {
            let mut regs = self.registers.lock().await;
            let link = CommandLink(&self.io);
            regs.get_mut(Dm100Register::MaskCfg).write(&link, mask).await?;
            link.write_command(cmd::DISABLE_INHIBIT, 0).await?;
            link.write_command(cmd::TRIGGER, 0).await?;
            link.write_command(cmd::ENABLE_INHIBIT, 0).await?;
        }
        let bytes = reader.read_exact(MASKED_READ_LEN).await?;
        Ok(bytes.to_vec())
    }

    async fn program_defaults(&self) -> Result<()> {
        use Dm100Register::*;

        let mut regs = self.registers.lock().await;
        let link = CommandLink(&self.io);
        regs.get_mut(ModeCfg).write(&link, 0x04).await?;
        for reg in [
            Lld, Uld, Hysteresis, ClkMux, Pretrig, Count, Posttrig, TrigCfg, PackCfg, MaskCfg,
            ModeCfg,
        ] {
            regs.get_mut(reg).write(&link, 0).await?;
        }
        for (f, value) in [
            (field::BUS8, 1),
            (field::ADD_HEADER, 0),
            (field::ADD_TIME, 1),
            (field::ADD_CHECKSUM, 0),
            (field::POLARITY, 1),
            (field::MODE, AcquisitionMode::Sample as u16),
        ] {
            regs.get_mut(f.register).set_field(&link, f.bits, value).await?;
        }
        debug!("default configuration programmed");
        Ok(())
    }

    /// Hardware description read during the handshake.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
    }

    /// Cached value of a whole register.
    pub async fn register(&self, reg: Dm100Register) -> u16 {
        self.registers.lock().await.value(reg)
    }

    /// Write a whole register.
    pub async fn write_register(&self, reg: Dm100Register, value: u16) -> Result<()> {
        self.state.ensure_running()?;
        let mut regs = self.registers.lock().await;
        regs.get_mut(reg).write(&CommandLink(&self.io), value).await
    }

    /// Cached value of one register field.
    pub async fn field(&self, f: Field) -> Result<u16> {
        self.registers.lock().await.field(f)
    }

    /// Read-modify-write one register field.
    pub async fn set_field(&self, f: Field, value: u16) -> Result<()> {
        self.state.ensure_running()?;
        let mut regs = self.registers.lock().await;
        regs.get_mut(f.register)
            .set_field(&CommandLink(&self.io), f.bits, value)
            .await
    }

    pub async fn mode(&self) -> Result<Option<AcquisitionMode>> {
        Ok(AcquisitionMode::from_bits(self.field(field::MODE).await?))
    }

    pub async fn set_mode(&self, mode: AcquisitionMode) -> Result<()> {
        self.set_field(field::MODE, mode as u16).await
    }

    /// Fire a software trigger.
    pub async fn trigger(&self) -> Result<()> {
        self.state.ensure_running()?;
        CommandLink(&self.io).write_command(cmd::TRIGGER, 0).await
    }

    async fn send_command(&self, command: u8) -> Result<()> {
        CommandLink(&self.io).write_command(command, 0).await
    }
}

#[async_trait]
impl Spectrometer for Dm100 {
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
        self.send_command(cmd::DISABLE_INHIBIT).await
    }

    async fn end(&self) -> Result<()> {
        self.state.ensure_running()?;
        self.send_command(cmd::ENABLE_INHIBIT).await
    }

    async fn next_event(&self) -> Result<Event> {
        self.state.ensure_running()?;
        let mut reader = self.reader.lock().await;
        let layout = EventLayout::from_registers(&*self.registers.lock().await)?;

        // Peek at the prefix so an abandoned read leaves the stream aligned.
        let prefix = layout.prefix_words();
        let head = reader.fill(prefix * 2).await?;
        let count = usize::from(u16::from_be_bytes([head[prefix * 2 - 2], head[prefix * 2 - 1]]));
        let words = reader
            .read_words_be(prefix + count + layout.suffix_words())
            .await?;
        protocol::decode_event(&layout, &words)
    }

    async fn get_prop(&self, id: u8) -> Result<u32> {
        self.state.ensure_running()?;
        property::require(&PROPERTIES, id)?;
        let reg = Dm100Register::from_id(id)
            .ok_or_else(|| Error::InvalidParameter(format!("no register with id {id}")))?;
        Ok(u32::from(self.register(reg).await))
    }

    async fn set_prop(&self, id: u8, value: u32) -> Result<()> {
        self.state.ensure_running()?;
        let desc = property::require(&PROPERTIES, id)?;
        desc.validate(value)?;
        let reg = Dm100Register::from_id(id)
            .ok_or_else(|| Error::InvalidParameter(format!("no register with id {id}")))?;
        let value = u16::try_from(value)
            .map_err(|_| Error::InvalidParameter(format!("{} value {value} too wide", desc.name)))?;
        self.write_register(reg, value).await
    }

    async fn close(&self) -> Result<()> {
        if self.state.close() != SessionState::Running {
            return Ok(());
        }
        if let Err(e) = self.send_command(cmd::ENABLE_INHIBIT).await {
            debug!(error = %e, "inhibit on close failed");
        }
        self.io.close().await?;
        info!("DM100 closed");
        Ok(())
    }
}
