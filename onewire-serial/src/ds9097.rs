//! The DS9097-class passive serial adapter.
//!
//! No intelligence on the far side: the UART itself shapes the line.
//! One 1-Wire bit is one UART byte at 115200 baud (`0xff` samples a 1,
//! `0x00` drives a 0, the echo's low bit is the sampled line state); a
//! bus reset is one `0xf0` byte at 9600 baud, slow enough that the
//! start bit stretches into a reset pulse and presence pulses land in
//! the echo.

use onewire_bus::{
    OneWireError, OneWireMaster, OneWireResult, OneWireStatus, SearchKind, SearchPass,
};

use crate::transport::{read_exact, ByteTransport, ReadBudget};

/// Baud rate at which one UART byte is one 1-Wire bit slot.
const BIT_BAUD: u32 = 115_200;
/// Baud rate at which one UART byte is a full reset/presence cycle.
const RESET_BAUD: u32 = 9_600;
/// UART byte driving a reset pulse.
const RESET_BYTE: u8 = 0xf0;
/// UART byte opening a sample (write-one / read) slot.
const BIT_ONE: u8 = 0xff;
/// UART byte driving a zero slot.
const BIT_ZERO: u8 = 0x00;

/// The echoed reset byte.
///
/// Presence pulses chew extra low bits into the echo, commonly turning
/// `0xf0` into `0x10`, `0x90` or `0xe0`. An unchanged echo means an
/// empty bus; an all-zero echo means something holds the line low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceEcho(
    /// The raw echo byte.
    pub u8,
);

impl OneWireStatus for PresenceEcho {
    fn presence(&self) -> bool {
        self.0 != RESET_BYTE && self.0 != 0x00
    }

    fn short_circuit(&self) -> bool {
        self.0 == 0x00
    }
}

/// A DS9097-class passive (bit-banged) serial bus master.
pub struct Ds9097<T> {
    transport: T,
}

impl<T: ByteTransport> Ds9097<T> {
    /// Wraps an opened transport.
    pub fn new(transport: T) -> Self {
        Ds9097 { transport }
    }

    /// Consumes the master, handing the transport back.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Releases the underlying transport.
    pub fn close(&mut self) {
        self.transport.close();
    }

    fn ensure_baud(&mut self, baud: u32) -> OneWireResult<()> {
        if self.transport.baud() != baud {
            self.transport.set_baud(baud)?;
        }
        Ok(())
    }

    /// One bit slot: drive or sample, return the line state.
    fn touch_bit(&mut self, bit: bool) -> OneWireResult<bool> {
        self.ensure_baud(BIT_BAUD)?;
        let tx = if bit { BIT_ONE } else { BIT_ZERO };
        self.transport.write_all(&[tx])?;
        let echo = read_exact(&mut self.transport, 1, &ReadBudget::bit_echo())?;
        Ok(echo[0] & 0x01 != 0)
    }

    /// One byte as eight slots, LSB first; returns the sampled byte.
    fn touch_byte(&mut self, byte: u8) -> OneWireResult<u8> {
        let mut echo = 0u8;
        for i in 0..8 {
            if self.touch_bit(byte & (1 << i) != 0)? {
                echo |= 1 << i;
            }
        }
        Ok(echo)
    }
}

impl<T: ByteTransport> OneWireMaster for Ds9097<T> {
    type Status = PresenceEcho;

    fn reset(&mut self) -> OneWireResult<PresenceEcho> {
        self.ensure_baud(RESET_BAUD)?;
        self.transport.reset_errors()?;
        self.transport.write_all(&[RESET_BYTE])?;
        let echo = read_exact(&mut self.transport, 1, &ReadBudget::bit_echo())?;
        self.ensure_baud(BIT_BAUD)?;
        Ok(PresenceEcho(echo[0]))
    }

    fn block(&mut self, data: &mut [u8]) -> OneWireResult<()> {
        for byte in data.iter_mut() {
            *byte = self.touch_byte(*byte)?;
        }
        Ok(())
    }

    fn search_pass(
        &mut self,
        kind: SearchKind,
        plan: &[u8; 8],
    ) -> OneWireResult<Option<SearchPass>> {
        self.touch_byte(kind.command())?;
        let mut rom = [0u8; 8];
        let mut discrepancies = [0u8; 8];
        for bit in 1..=64u8 {
            let idx = ((bit - 1) / 8) as usize;
            let mask = 1u8 << ((bit - 1) % 8);
            let id_bit = self.touch_bit(true)?;
            let cmp_id_bit = self.touch_bit(true)?;
            if id_bit && cmp_id_bit {
                // Nothing drives the slots: no device answered (or the
                // chosen branch just went dead).
                return Ok(None);
            }
            let dir = if id_bit != cmp_id_bit {
                id_bit
            } else {
                discrepancies[idx] |= mask;
                plan[idx] & mask != 0
            };
            self.touch_bit(dir)?;
            if dir {
                rom[idx] |= mask;
            }
        }
        Ok(Some(SearchPass { rom, discrepancies }))
    }
}

// Presence diagnostics on this adapter are best-effort: some clones
// echo values outside the usual 0x10/0x90/0xe0 set.
// TODO: collect echoes from the adapters in the field and widen the
// short-circuit heuristic if 0x00 turns out to be a legitimate echo.
