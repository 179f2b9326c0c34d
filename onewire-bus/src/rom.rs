//! 64-bit ROM identifiers carried by every 1-Wire slave.

use core::fmt;
use core::str::FromStr;

use crate::crc::crc8;
use crate::error::OneWireError;

/// A 64-bit ROM identifier, `family(1) || serial(6) || crc8(1)`, stored
/// in wire (LSB-first) order.
///
/// Constructed from the bus during a search, or parsed from the
/// canonical printable form `FF.123456789ABC.CC` (family, serial in bus
/// order, CRC). Read-only thereafter.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RomId([u8; 8]);

impl RomId {
    /// The all-zero placeholder id. Used by the firmware-offload master
    /// to demultiplex replies to skip-ROM transactions.
    pub const ZERO: RomId = RomId([0; 8]);

    /// Build an id from its wire-order bytes. No CRC check is applied;
    /// use [`is_valid`](RomId::is_valid) where one is required.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        RomId(bytes)
    }

    /// The raw wire-order bytes, family first.
    pub const fn bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// The family code (first byte on the wire).
    pub const fn family(&self) -> u8 {
        self.0[0]
    }

    /// The six serial-number bytes in bus order.
    pub fn serial(&self) -> &[u8] {
        &self.0[1..7]
    }

    /// The CRC-8 byte as stored on the device.
    pub const fn crc(&self) -> u8 {
        self.0[7]
    }

    /// CRC-8 over `family || serial`, the value the last byte must hold.
    pub fn crc8_of(&self) -> u8 {
        crc8(&self.0[..7])
    }

    /// Whether the stored CRC matches the computed one.
    pub fn is_valid(&self) -> bool {
        self.crc8_of() == self.crc()
    }

    /// The id as a little-endian integer, family in the low byte.
    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    /// The bit at 1-based position `bit` (1..=64) in wire order.
    pub(crate) fn bit(&self, bit: u8) -> bool {
        debug_assert!((1..=64).contains(&bit));
        let idx = ((bit - 1) / 8) as usize;
        let mask = 1u8 << ((bit - 1) % 8);
        self.0[idx] & mask != 0
    }
}

impl fmt::Display for RomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}.", self.0[0])?;
        for b in &self.0[1..7] {
            write!(f, "{b:02X}")?;
        }
        write!(f, ".{:02X}", self.0[7])
    }
}

impl fmt::Debug for RomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for RomId {
    type Err = OneWireError;

    /// Parse the printable form. Dot separators are optional and hex
    /// case is ignored; the CRC part may be omitted, in which case it is
    /// computed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: Vec<u8> = s
            .bytes()
            .filter(|b| !matches!(b, b'.' | b' '))
            .collect();
        if hex.len() != 14 && hex.len() != 16 {
            return Err(OneWireError::InvalidRomId);
        }
        let mut bytes = [0u8; 8];
        for (i, pair) in hex.chunks_exact(2).enumerate() {
            let s = core::str::from_utf8(pair).map_err(|_| OneWireError::InvalidRomId)?;
            bytes[i] = u8::from_str_radix(s, 16).map_err(|_| OneWireError::InvalidRomId)?;
        }
        let mut rom = RomId(bytes);
        if hex.len() == 14 {
            rom.0[7] = rom.crc8_of();
        }
        Ok(rom)
    }
}
