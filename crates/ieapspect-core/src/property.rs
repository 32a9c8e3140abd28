//! Device property descriptors and the little-endian value codec.
//!
//! Properties are small unsigned integers addressed by a one-byte id. Each
//! device publishes a static table of [`PropertyDescriptor`]s; the table is
//! the single source of truth for a property's wire width and valid range.

use std::ops::Range;

use crate::error::{Error, Result};

/// Static description of one device property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// One-byte property id used on the wire.
    pub id: u8,
    /// Human readable name.
    pub name: &'static str,
    /// Encoded width in bytes (1 or 2).
    pub width: usize,
    /// Accepted values, half-open.
    pub range: Range<u32>,
}

impl PropertyDescriptor {
    pub const fn new(id: u8, name: &'static str, width: usize, range: Range<u32>) -> Self {
        Self {
            id,
            name,
            width,
            range,
        }
    }

    /// Check that `value` lies in this property's range.
    pub fn validate(&self, value: u32) -> Result<()> {
        if self.range.contains(&value) {
            Ok(())
        } else {
            Err(Error::InvalidParameter(format!(
                "{} value {} outside {}..{}",
                self.name, value, self.range.start, self.range.end
            )))
        }
    }

    /// Validate and encode `value` at this property's width.
    pub fn encode(&self, value: u32) -> Result<Vec<u8>> {
        self.validate(value)?;
        Ok(encode_le(value, self.width))
    }

    /// Decode a value of this property's width.
    pub fn decode(&self, bytes: &[u8]) -> Result<u32> {
        if bytes.len() != self.width {
            return Err(Error::Protocol(format!(
                "{} expects {} value bytes, got {}",
                self.name,
                self.width,
                bytes.len()
            )));
        }
        Ok(decode_le(bytes))
    }
}

/// Find a descriptor by id.
pub fn lookup(table: &[PropertyDescriptor], id: u8) -> Option<&PropertyDescriptor> {
    table.iter().find(|p| p.id == id)
}

/// Like [`lookup`], but an unknown id is an [`Error::InvalidParameter`].
pub fn require(table: &[PropertyDescriptor], id: u8) -> Result<&PropertyDescriptor> {
    lookup(table, id)
        .ok_or_else(|| Error::InvalidParameter(format!("unknown property id {id:#04x}")))
}

/// Encode the low `width` bytes of `value`, least significant first.
pub fn encode_le(value: u32, width: usize) -> Vec<u8> {
    value.to_le_bytes().into_iter().take(width).collect()
}

/// Decode up to four bytes, least significant first.
pub fn decode_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .enumerate()
        .fold(0u32, |acc, (i, &b)| acc | (u32::from(b) << (8 * i)))
}
