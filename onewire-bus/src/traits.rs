use std::time::Duration;

use crate::consts::{ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_SLOT, ONEWIRE_SKIP_ROM_CMD};
use crate::error::{OneWireError, OneWireResult};
use crate::rom::RomId;
use crate::search::SearchKind;
use crate::transaction::Transaction;

/// Status returned by a bus reset.
///
/// Backends surface their native reply byte through this trait; callers
/// that need a transportable value convert with [`ResetOutcome::from_status`].
pub trait OneWireStatus {
    /// Whether at least one slave answered with a presence pulse.
    fn presence(&self) -> bool;
    /// Whether a slave signalled an alarm condition during presence.
    /// Only the active master can observe this; others report `false`.
    fn alarming(&self) -> bool {
        false
    }
    /// Whether the bus looked shorted or unpowered.
    fn short_circuit(&self) -> bool {
        false
    }
}

/// A backend-independent snapshot of a reset reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOutcome {
    /// A presence pulse was seen.
    pub presence: bool,
    /// An alarming presence was seen.
    pub alarming: bool,
    /// The line sampled shorted or unpowered.
    pub short_circuit: bool,
}

impl ResetOutcome {
    /// Capture a backend status into a plain value.
    pub fn from_status<S: OneWireStatus>(status: &S) -> Self {
        ResetOutcome {
            presence: status.presence(),
            alarming: status.alarming(),
            short_circuit: status.short_circuit(),
        }
    }
}

/// The outcome of one full 64-bit search round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPass {
    /// The ROM bytes accumulated bit by bit, wire order.
    pub rom: [u8; 8],
    /// One flag per ROM bit position: set where both read slots sampled
    /// zero, i.e. where devices branched.
    pub discrepancies: [u8; 8],
}

/// Line power level selectable on masters that implement
/// [`OneWireMaster::set_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusLevel {
    /// Regular open-drain idle level.
    Normal,
    /// Strong pull-up, powering parasitic slaves during a conversion.
    StrongPullup,
}

/// The shared capability set of a 1-Wire bus master:
/// `{reset, block, search, level?}`.
///
/// The protocol engine drives these primitives; per-device drivers never
/// see them and go through [`Transaction`]s instead. Optional
/// capabilities default to [`OneWireError::Unsupported`] so callers can
/// probe and fall back, the same way an unimplemented triplet read falls
/// back to single-bit slots on simpler silicon.
pub trait OneWireMaster {
    /// The status type returned by the reset operation.
    type Status: OneWireStatus;

    /// Resets the 1-Wire bus and returns the status of the bus.
    fn reset(&mut self) -> OneWireResult<Self::Status>;

    /// Transmits `data` on the bus and replaces every byte with its
    /// line echo. Read slots are opened by `0xff` fill bytes in `data`.
    fn block(&mut self, data: &mut [u8]) -> OneWireResult<()>;

    /// Runs one 64-bit search round for `kind`, following `plan` at
    /// every branch point. Returns `None` when no device answered the
    /// search command (both read slots sampled 1 on the first bit).
    ///
    /// The plan carries one branch direction per ROM bit position; the
    /// master only consults it where the bus reports a discrepancy.
    fn search_pass(&mut self, kind: SearchKind, plan: &[u8; 8])
        -> OneWireResult<Option<SearchPass>>;

    /// Changes the line power level. Only the active serial master
    /// implements the strong pull-up primitive.
    fn set_level(&mut self, level: BusLevel) -> OneWireResult<()> {
        let _ = level;
        Err(OneWireError::Unsupported)
    }

    /// Enumerates the whole bus in one request, for masters whose
    /// firmware walks the search tree itself. Callers try this first
    /// and fall back to the incremental search state machine on
    /// [`OneWireError::Unsupported`].
    fn enumerate_offload(&mut self, kind: SearchKind) -> OneWireResult<Vec<RomId>> {
        let _ = kind;
        Err(OneWireError::Unsupported)
    }

    /// Runs a complete transaction: reset, selection, write, read fill,
    /// delay. Returns exactly `txn.read_len` echo bytes.
    ///
    /// The provided implementation composes the primitives above;
    /// masters that defer whole transactions to a coprocessor override
    /// it.
    fn execute(&mut self, txn: &Transaction) -> OneWireResult<Vec<u8>> {
        if txn.reset {
            let status = self.reset()?;
            if !status.presence() && !txn.allow_absent {
                return Err(OneWireError::NoPresence);
            }
        }
        let mut frame = Vec::with_capacity(9 + txn.write.len() + txn.read_len);
        match &txn.target {
            Some(rom) => {
                frame.push(ONEWIRE_MATCH_ROM_CMD);
                frame.extend_from_slice(rom.bytes());
            }
            None => frame.push(ONEWIRE_SKIP_ROM_CMD),
        }
        let data_at = frame.len();
        frame.extend_from_slice(&txn.write);
        frame.resize(data_at + txn.write.len() + txn.read_len, ONEWIRE_READ_SLOT);
        self.block(&mut frame)?;
        if txn.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(txn.delay_ms));
        }
        Ok(frame[data_at + txn.write.len()..].to_vec())
    }
}
