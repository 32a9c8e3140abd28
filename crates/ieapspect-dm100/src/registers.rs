//! DM100 register map.
//!
//! The digitizer is configured through write-only registers, one command
//! code per byte. Sixteen-bit registers take two commands, high byte first.
//! The host cache in [`RegisterFile`] is the only record of the current
//! configuration.

use ieapspect_core::error::Result;
use ieapspect_core::property::PropertyDescriptor;
use ieapspect_core::register::{BitField, Register, RegisterAddress};

/// Command codes.
pub mod cmd {
    pub const LLD: u8 = 128;
    pub const ULD: u8 = 130;
    pub const HYSTERESIS: u8 = 132;
    pub const CLKMUX: u8 = 133;
    pub const PRETRIG: u8 = 134;
    pub const COUNT: u8 = 136;
    pub const POSTTRIG: u8 = 138;
    pub const MODECFG: u8 = 140;
    pub const TRIGGER: u8 = 141;
    pub const TRIGCFG: u8 = 142;
    pub const PACKCFG: u8 = 143;
    pub const DISABLE_INHIBIT: u8 = 144;
    pub const MASKCFG: u8 = 148;
    pub const ENABLE_INHIBIT: u8 = 191;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dm100Register {
    /// Lower level discriminator.
    Lld,
    /// Upper level discriminator.
    Uld,
    Hysteresis,
    ClkMux,
    Pretrig,
    Count,
    Posttrig,
    ModeCfg,
    TrigCfg,
    PackCfg,
    MaskCfg,
}

impl Dm100Register {
    pub const ALL: [Dm100Register; 11] = [
        Dm100Register::Lld,
        Dm100Register::Uld,
        Dm100Register::Hysteresis,
        Dm100Register::ClkMux,
        Dm100Register::Pretrig,
        Dm100Register::Count,
        Dm100Register::Posttrig,
        Dm100Register::ModeCfg,
        Dm100Register::TrigCfg,
        Dm100Register::PackCfg,
        Dm100Register::MaskCfg,
    ];

    pub const fn address(self) -> RegisterAddress {
        match self {
            Dm100Register::Lld => RegisterAddress::dual(cmd::LLD),
            Dm100Register::Uld => RegisterAddress::dual(cmd::ULD),
            Dm100Register::Hysteresis => RegisterAddress::Single(cmd::HYSTERESIS),
            Dm100Register::ClkMux => RegisterAddress::Single(cmd::CLKMUX),
            Dm100Register::Pretrig => RegisterAddress::dual(cmd::PRETRIG),
            Dm100Register::Count => RegisterAddress::dual(cmd::COUNT),
            Dm100Register::Posttrig => RegisterAddress::dual(cmd::POSTTRIG),
            Dm100Register::ModeCfg => RegisterAddress::Single(cmd::MODECFG),
            Dm100Register::TrigCfg => RegisterAddress::Single(cmd::TRIGCFG),
            Dm100Register::PackCfg => RegisterAddress::Single(cmd::PACKCFG),
            Dm100Register::MaskCfg => RegisterAddress::Single(cmd::MASKCFG),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Dm100Register::Lld => "LLD",
            Dm100Register::Uld => "ULD",
            Dm100Register::Hysteresis => "Hysteresis",
            Dm100Register::ClkMux => "Clock Mux",
            Dm100Register::Pretrig => "Pretrigger",
            Dm100Register::Count => "Count",
            Dm100Register::Posttrig => "Posttrigger",
            Dm100Register::ModeCfg => "Mode Config",
            Dm100Register::TrigCfg => "Trigger Config",
            Dm100Register::PackCfg => "Packet Config",
            Dm100Register::MaskCfg => "Mask Config",
        }
    }

    /// Look a register up by its (high byte) command code.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.address().id() == id)
    }
}

/// Property table: one entry per register, keyed by command code.
pub static PROPERTIES: [PropertyDescriptor; 11] = [
    PropertyDescriptor::new(cmd::LLD, "LLD", 2, 0..0x10000),
    PropertyDescriptor::new(cmd::ULD, "ULD", 2, 0..0x10000),
    PropertyDescriptor::new(cmd::HYSTERESIS, "Hysteresis", 1, 0..0x100),
    PropertyDescriptor::new(cmd::CLKMUX, "Clock Mux", 1, 0..0x100),
    PropertyDescriptor::new(cmd::PRETRIG, "Pretrigger", 2, 0..0x10000),
    PropertyDescriptor::new(cmd::COUNT, "Count", 2, 0..0x10000),
    PropertyDescriptor::new(cmd::POSTTRIG, "Posttrigger", 2, 0..0x10000),
    PropertyDescriptor::new(cmd::MODECFG, "Mode Config", 1, 0..0x100),
    PropertyDescriptor::new(cmd::TRIGCFG, "Trigger Config", 1, 0..0x100),
    PropertyDescriptor::new(cmd::PACKCFG, "Packet Config", 1, 0..0x100),
    PropertyDescriptor::new(cmd::MASKCFG, "Mask Config", 1, 0..0x100),
];

/// A named bit field inside one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub register: Dm100Register,
    pub bits: BitField,
}

impl Field {
    const fn new(register: Dm100Register, offset: u8, width: u8) -> Self {
        Self {
            register,
            bits: BitField::new(offset, width),
        }
    }
}

/// Bit fields of the configuration registers.
pub mod field {
    use super::{Dm100Register::*, Field};

    pub const MODE: Field = Field::new(ModeCfg, 4, 3);
    pub const START_MODE: Field = Field::new(ModeCfg, 2, 2);
    pub const END_MODE: Field = Field::new(ModeCfg, 0, 2);

    pub const GOTHROUGH: Field = Field::new(TrigCfg, 7, 1);
    pub const DERANDOM: Field = Field::new(TrigCfg, 6, 1);
    pub const DEALTER: Field = Field::new(TrigCfg, 5, 1);
    pub const POLARITY: Field = Field::new(TrigCfg, 4, 1);
    pub const EXTRIG_CFG: Field = Field::new(TrigCfg, 2, 2);
    pub const GATE_CFG: Field = Field::new(TrigCfg, 0, 2);

    pub const ADD_HEADER: Field = Field::new(PackCfg, 7, 1);
    pub const ADD_TIME: Field = Field::new(PackCfg, 6, 1);
    pub const ADD_CHECKSUM: Field = Field::new(PackCfg, 5, 1);
    pub const BUS8: Field = Field::new(PackCfg, 0, 1);

    pub const ADD_LOST: Field = Field::new(MaskCfg, 7, 1);
}

/// Acquisition mode (MODECFG bits 4..7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// One sample per event.
    Sample = 0b000,
    /// Sample plus time over threshold.
    SampleTot = 0b001,
    /// Full waveform per event.
    Waveform = 0b100,
}

impl AcquisitionMode {
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            0b000 => Some(AcquisitionMode::Sample),
            0b001 => Some(AcquisitionMode::SampleTot),
            0b100 => Some(AcquisitionMode::Waveform),
            _ => None,
        }
    }
}

/// What opens an acquisition window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Lld = 0b00,
    External = 0b01,
}

/// What closes an acquisition window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndMode {
    Lld = 0b00,
    Count = 0b01,
}

/// Host-side cache of every register.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    regs: Vec<Register>,
}

impl RegisterFile {
    /// All registers, cached as zero.
    pub fn new() -> Self {
        Self {
            regs: Dm100Register::ALL
                .into_iter()
                .map(|r| Register::new(r.name(), r.address()))
                .collect(),
        }
    }

    pub fn get(&self, reg: Dm100Register) -> &Register {
        &self.regs[reg as usize]
    }

    pub fn get_mut(&mut self, reg: Dm100Register) -> &mut Register {
        &mut self.regs[reg as usize]
    }

    pub fn value(&self, reg: Dm100Register) -> u16 {
        self.get(reg).value()
    }

    pub fn field(&self, field: Field) -> Result<u16> {
        self.get(field.register).get_field(field.bits)
    }

    pub fn flag(&self, field: Field) -> Result<bool> {
        Ok(self.field(field)? != 0)
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
