//! The DS2480-class active serial master.
//!
//! One byte stream carries two sub-channels: `0xe3` switches the chip
//! into command mode, `0xe1` into data mode, and a literal `0xe3` data
//! byte must be doubled so it cannot be misread as a mode switch. The
//! chip runs the reset, level and search-accelerator machinery itself;
//! the host only frames requests and interprets reply masks.

use bitfield_struct::bitfield;

use onewire_bus::{
    OneWireError, OneWireMaster, OneWireResult, OneWireStatus, SearchKind, SearchPass,
};

use crate::transport::{read_exact, ByteTransport, ReadBudget};

/// Switch the chip into command mode.
const MODE_COMMAND: u8 = 0xe3;
/// Switch the chip into data mode.
const MODE_DATA: u8 = 0xe1;
/// Reset at flex speed.
const CMD_RESET: u8 = 0xc5;
/// Search accelerator on, flex speed.
const CMD_SEARCH_ON: u8 = 0xb5;
/// Search accelerator off, flex speed.
const CMD_SEARCH_OFF: u8 = 0xa5;
/// Arm the strong pull-up.
const CMD_PULLUP_ARM: u8 = 0x3f;
/// Disarm the pull-up.
const CMD_PULLUP_DISARM: u8 = 0xed;
/// Terminate the pulse.
const CMD_PULSE_TERMINATE: u8 = 0xf1;
/// Reply mask for level-change confirmations.
const LEVEL_REPLY_MASK: u8 = 0xec;

/// Which sub-channel the chip currently interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Command,
    Data,
}

/// The reply byte to a reset command.
#[bitfield(u8)]
pub struct ResetReply {
    /// Presence code: `00` shorted line, `01` presence, `10` alarming
    /// presence, `11` empty bus.
    #[bits(2)]
    presence_code: u8,
    /// Chip revision.
    #[bits(3)]
    chip_id: u8,
    #[bits(1)]
    reserved: bool,
    /// Must read `0b11` for a valid command reply.
    #[bits(2)]
    ack: u8,
}

impl ResetReply {
    fn acked(&self) -> bool {
        self.ack() == 0b11
    }
}

impl OneWireStatus for ResetReply {
    fn presence(&self) -> bool {
        matches!(self.presence_code(), 0b01 | 0b10)
    }

    fn alarming(&self) -> bool {
        self.presence_code() == 0b10
    }

    fn short_circuit(&self) -> bool {
        self.presence_code() == 0b00
    }
}

/// Doubles every literal `0xe3` so it survives data mode.
pub fn escape_data(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        out.push(byte);
        if byte == MODE_COMMAND {
            out.push(byte);
        }
    }
    out
}

/// Collapses doubled `0xe3` bytes; the inverse of [`escape_data`].
pub fn unescape_data(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        out.push(byte);
        if byte == MODE_COMMAND && iter.peek() == Some(&MODE_COMMAND) {
            iter.next();
        }
    }
    out
}

/// A DS2480-class active serial bus master.
pub struct Ds2480<T> {
    transport: T,
    mode: Mode,
}

impl<T: ByteTransport> Ds2480<T> {
    /// Wraps an opened transport. The chip is assumed to have seen its
    /// timing byte during detection.
    pub fn new(transport: T) -> Self {
        Ds2480 {
            transport,
            mode: Mode::Command,
        }
    }

    /// Consumes the master, handing the transport back.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Releases the underlying transport.
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Prefixes `frame` with a data-mode switch when needed and tracks
    /// the mode the chip is left in.
    fn enter_data(&mut self, frame: &mut Vec<u8>) {
        if self.mode != Mode::Data {
            frame.push(MODE_DATA);
            self.mode = Mode::Data;
        }
    }

    fn enter_command(&mut self, frame: &mut Vec<u8>) {
        if self.mode != Mode::Command {
            frame.push(MODE_COMMAND);
            self.mode = Mode::Command;
        }
    }

    fn reset_once(&mut self) -> OneWireResult<ResetReply> {
        // The explicit mode switch is a no-op when already in command
        // mode and resynchronizes the chip when it is not.
        self.mode = Mode::Command;
        self.transport.write_all(&[MODE_COMMAND, CMD_RESET])?;
        let reply = read_exact(&mut self.transport, 1, &ReadBudget::command_reply())?;
        Ok(ResetReply::from_bits(reply[0]))
    }

    /// Packs the 64 branch directions into the 16-byte accelerator
    /// request: the direction occupies the high bit of each 2-bit pair.
    fn pack_plan(plan: &[u8; 8]) -> [u8; 16] {
        let mut packed = [0u8; 16];
        for bit in 0..64usize {
            if plan[bit / 8] & (1 << (bit % 8)) != 0 {
                packed[bit / 4] |= 1 << ((bit % 4) * 2 + 1);
            }
        }
        packed
    }

    /// Unpacks the 16 reply bytes into ROM bits (high bit of each pair)
    /// and discrepancy flags (low bit).
    fn unpack_reply(reply: &[u8]) -> ([u8; 8], [u8; 8]) {
        let mut rom = [0u8; 8];
        let mut discrepancies = [0u8; 8];
        for bit in 0..64usize {
            let pair = reply[bit / 4] >> ((bit % 4) * 2);
            if pair & 0b10 != 0 {
                rom[bit / 8] |= 1 << (bit % 8);
            }
            if pair & 0b01 != 0 {
                discrepancies[bit / 8] |= 1 << (bit % 8);
            }
        }
        (rom, discrepancies)
    }

    fn level_sequence(&mut self, cmds: &[u8], replies: usize) -> OneWireResult<()> {
        let mut frame = Vec::with_capacity(cmds.len() + 1);
        frame.push(MODE_COMMAND);
        self.mode = Mode::Command;
        frame.extend_from_slice(cmds);
        self.transport.write_all(&frame)?;
        let reply = read_exact(&mut self.transport, replies, &ReadBudget::command_reply())?;
        for byte in reply {
            if byte & LEVEL_REPLY_MASK != LEVEL_REPLY_MASK {
                return Err(OneWireError::ProtocolFraming("level reply mask"));
            }
        }
        Ok(())
    }
}

impl<T: ByteTransport> OneWireMaster for Ds2480<T> {
    type Status = ResetReply;

    /// Reset with one blind retry: a garbled ack earns a buffer clear
    /// and a second attempt before the framing error surfaces.
    fn reset(&mut self) -> OneWireResult<ResetReply> {
        let first = self.reset_once()?;
        if first.acked() {
            return Ok(first);
        }
        log::warn!(
            "reset reply {:#04x} failed the ack mask, retrying",
            first.into_bits()
        );
        self.transport.reset_errors()?;
        let second = self.reset_once()?;
        if second.acked() {
            return Ok(second);
        }
        Err(OneWireError::ProtocolFraming("reset ack mask"))
    }

    fn block(&mut self, data: &mut [u8]) -> OneWireResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut frame = Vec::with_capacity(data.len() + 1);
        self.enter_data(&mut frame);
        frame.extend_from_slice(&escape_data(data));
        self.transport.write_all(&frame)?;
        // Doubled escape bytes transmit once, so exactly one echo comes
        // back per payload byte.
        let echo = read_exact(&mut self.transport, data.len(), &ReadBudget::command_reply())?;
        data.copy_from_slice(&echo);
        Ok(())
    }

    fn search_pass(
        &mut self,
        kind: SearchKind,
        plan: &[u8; 8],
    ) -> OneWireResult<Option<SearchPass>> {
        // Search command in data mode, then the accelerator switch.
        let mut frame = Vec::with_capacity(4);
        self.enter_data(&mut frame);
        frame.push(kind.command());
        self.enter_command(&mut frame);
        frame.push(CMD_SEARCH_ON);
        self.transport.write_all(&frame)?;
        let echo = read_exact(&mut self.transport, 1, &ReadBudget::command_reply())?;
        if echo[0] != kind.command() {
            return Err(OneWireError::ProtocolFraming("search command echo"));
        }

        // 16 bytes of branch directions, accelerator off afterwards.
        let packed = Self::pack_plan(plan);
        let mut frame = Vec::with_capacity(packed.len() + 4);
        self.enter_data(&mut frame);
        frame.extend_from_slice(&escape_data(&packed));
        self.enter_command(&mut frame);
        frame.push(CMD_SEARCH_OFF);
        self.transport.write_all(&frame)?;
        let reply = read_exact(&mut self.transport, 16, &ReadBudget::command_reply())?;

        let (rom, discrepancies) = Self::unpack_reply(&reply);
        if rom == [0xff; 8] {
            // Every id slot sampled 1: nothing answered the search.
            return Ok(None);
        }
        Ok(Some(SearchPass { rom, discrepancies }))
    }

    fn set_level(&mut self, level: onewire_bus::BusLevel) -> OneWireResult<()> {
        match level {
            onewire_bus::BusLevel::StrongPullup => {
                self.level_sequence(&[CMD_PULLUP_ARM, CMD_PULLUP_DISARM], 1)
            }
            onewire_bus::BusLevel::Normal => self.level_sequence(
                &[
                    CMD_PULSE_TERMINATE,
                    CMD_PULLUP_DISARM,
                    CMD_PULSE_TERMINATE,
                ],
                2,
            ),
        }
    }
}
