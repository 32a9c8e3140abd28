//! Host-cached device registers with bit-field read-modify-write.
//!
//! Register-configured devices cannot be read back, so the host keeps the
//! last value it wrote and treats that cache as the truth. Every field
//! update recomputes the whole register from the cache and writes it in
//! full; the cache only changes once the write has gone out.
//!
//! A register is addressed by one command code (8-bit register) or by a
//! pair of codes (16-bit register, high byte first).

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Sink for raw register commands: a command code plus one data byte.
#[async_trait]
pub trait RegisterWriter: Send + Sync {
    async fn write_command(&self, command: u8, data: u8) -> Result<()>;
}

/// How a register is addressed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAddress {
    /// 8-bit register written with one command.
    Single(u8),
    /// 16-bit register written as two commands, high byte first.
    Dual { high: u8, low: u8 },
}

impl RegisterAddress {
    /// A 16-bit register whose low-byte command follows the high-byte one.
    pub const fn dual(high: u8) -> Self {
        RegisterAddress::Dual {
            high,
            low: high + 1,
        }
    }

    /// Command code that identifies the register (the high-byte code for
    /// 16-bit registers).
    pub const fn id(&self) -> u8 {
        match *self {
            RegisterAddress::Single(cmd) => cmd,
            RegisterAddress::Dual { high, .. } => high,
        }
    }

    /// Largest value the register can hold.
    pub const fn max_value(&self) -> u16 {
        match self {
            RegisterAddress::Single(_) => 0xFF,
            RegisterAddress::Dual { .. } => 0xFFFF,
        }
    }
}

/// A contiguous run of bits inside a register.
///
/// A field is usable when it is at least one bit wide and ends at or below
/// bit 16. Every accessor checks this and reports `InvalidParameter`
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub offset: u8,
    pub width: u8,
}

impl BitField {
    pub const fn new(offset: u8, width: u8) -> Self {
        Self { offset, width }
    }

    /// A single-bit boolean field.
    pub const fn flag(offset: u8) -> Self {
        Self { offset, width: 1 }
    }

    /// Whether the field fits inside a 16-bit register.
    pub const fn is_valid(&self) -> bool {
        self.width > 0 && self.offset as u32 + self.width as u32 <= 16
    }

    fn check(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::InvalidParameter(format!(
                "bit field at offset {} width {} does not fit in 16 bits",
                self.offset, self.width
            )))
        }
    }

    pub fn max_value(&self) -> Result<u16> {
        self.check()?;
        Ok(((1u32 << self.width) - 1) as u16)
    }

    pub fn mask(&self) -> Result<u16> {
        Ok(self.max_value()? << self.offset)
    }

    /// Read this field out of a raw register value.
    pub fn extract(&self, raw: u16) -> Result<u16> {
        Ok((raw & self.mask()?) >> self.offset)
    }

    /// Replace this field inside `raw`, leaving every other bit alone.
    pub fn insert(&self, raw: u16, value: u16) -> Result<u16> {
        let max = self.max_value()?;
        if value > max {
            return Err(Error::InvalidParameter(format!(
                "value {} does not fit in {} bit(s)",
                value, self.width
            )));
        }
        Ok((raw & !(max << self.offset)) | (value << self.offset))
    }
}

/// A write-only register together with its host-side cache.
#[derive(Debug, Clone)]
pub struct Register {
    name: &'static str,
    address: RegisterAddress,
    value: u16,
}

impl Register {
    /// A register whose cache starts at zero.
    pub const fn new(name: &'static str, address: RegisterAddress) -> Self {
        Self {
            name,
            address,
            value: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn address(&self) -> RegisterAddress {
        self.address
    }

    /// The cached (last written) value.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Write the whole register and update the cache.
    pub async fn write<W>(&mut self, writer: &W, value: u16) -> Result<()>
    where
        W: RegisterWriter + ?Sized,
    {
        if value > self.address.max_value() {
            return Err(Error::InvalidParameter(format!(
                "{} value {:#x} exceeds {:#x}",
                self.name,
                value,
                self.address.max_value()
            )));
        }
        match self.address {
            RegisterAddress::Single(cmd) => {
                writer.write_command(cmd, value as u8).await?;
            }
            RegisterAddress::Dual { high, low } => {
                writer.write_command(high, (value >> 8) as u8).await?;
                writer.write_command(low, (value & 0xFF) as u8).await?;
            }
        }
        tracing::trace!(register = self.name, value, "register written");
        self.value = value;
        Ok(())
    }

    pub fn get_bit(&self, offset: u8) -> Result<bool> {
        Ok(self.get_field(BitField::flag(offset))? != 0)
    }

    pub async fn set_bit<W>(&mut self, writer: &W, offset: u8, on: bool) -> Result<()>
    where
        W: RegisterWriter + ?Sized,
    {
        self.set_field(writer, BitField::flag(offset), u16::from(on))
            .await
    }

    pub fn get_field(&self, field: BitField) -> Result<u16> {
        field.extract(self.value)
    }

    /// Read-modify-write one field against the cached value.
    pub async fn set_field<W>(&mut self, writer: &W, field: BitField, value: u16) -> Result<()>
    where
        W: RegisterWriter + ?Sized,
    {
        let raw = field.insert(self.value, value)?;
        self.write(writer, raw).await
    }
}
