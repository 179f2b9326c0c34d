use crate::{
    crc::OneWireCrc,
    error::{OneWireError, OneWireResult},
    rom::RomId,
    traits::{OneWireMaster, OneWireStatus},
    ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD,
};

/// Type of search performed by [`OneWireSearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SearchKind {
    /// Enumerate every device on the bus.
    Discover = ONEWIRE_SEARCH_CMD,
    /// Enumerate only devices with the alarm condition asserted.
    Alarm = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

impl SearchKind {
    /// The ROM command byte transmitted for this search.
    pub const fn command(self) -> u8 {
        self as u8
    }
}

/// Counters tracked across successive search rounds.
///
/// Cleared by the first round of a sequence, updated by every
/// successful one, and reset whenever a round fails on CRC or presence.
/// One instance per active search sequence; the enumerator owns them.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    done: bool,
    rom: [u8; 8],
}

impl SearchState {
    /// A fresh state, positioned before the first device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the walk to the first device.
    pub fn clear(&mut self) {
        *self = SearchState::default();
    }

    /// Terminal flag: the last round left no unexplored branch.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bit index (1–64) of the most recent branch point, 0 when none.
    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }

    /// The most recent branch point within the family byte (bits 1–8).
    pub fn last_family_discrepancy(&self) -> u8 {
        self.last_family_discrepancy
    }

    /// Branch directions for the next round, one bit per ROM position:
    /// below the branch point follow the previous ROM, at it take 1,
    /// beyond it take 0.
    fn plan(&self) -> [u8; 8] {
        let mut plan = [0u8; 8];
        for bit in 1..=64u8 {
            let idx = ((bit - 1) / 8) as usize;
            let mask = 1u8 << ((bit - 1) % 8);
            let dir = if bit < self.last_discrepancy {
                self.rom[idx] & mask != 0
            } else {
                bit == self.last_discrepancy
            };
            if dir {
                plan[idx] |= mask;
            }
        }
        plan
    }

    /// Folds a completed pass into the counters and reports the new
    /// branch point.
    fn absorb(&mut self, rom: &[u8; 8], discrepancies: &[u8; 8]) {
        let mut last_zero = 0u8;
        for bit in 1..=64u8 {
            let idx = ((bit - 1) / 8) as usize;
            let mask = 1u8 << ((bit - 1) % 8);
            if discrepancies[idx] & mask != 0 && rom[idx] & mask == 0 {
                last_zero = bit;
                if bit < 9 {
                    self.last_family_discrepancy = bit;
                }
            }
        }
        self.last_discrepancy = last_zero;
        self.done = last_zero == 0;
        self.rom = *rom;
    }
}

/// A structure for searching devices on a 1-Wire bus.
///
/// Implements the classical branch-and-bound ROM search over a
/// [`OneWireMaster`], one 64-bit round per [`next`](OneWireSearch::next)
/// call. The state lives outside the driver so a sequence can span
/// multiple borrows of the master.
pub struct OneWireSearch<'a, M> {
    master: &'a mut M,
    kind: SearchKind,
    state: &'a mut SearchState,
}

impl<'a, M> OneWireSearch<'a, M> {
    /// Creates a search driver over `master` for one round or more of
    /// the sequence tracked by `state`.
    pub fn new(master: &'a mut M, kind: SearchKind, state: &'a mut SearchState) -> Self {
        Self {
            master,
            kind,
            state,
        }
    }
}

impl<M: OneWireMaster> OneWireSearch<'_, M> {
    /// Finds the next device on the bus.
    ///
    /// Returns `Ok(None)` once the sequence is exhausted or when no
    /// device answers the search command. A failed reset or CRC clears
    /// the state so the caller may retry from the beginning.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> OneWireResult<Option<RomId>> {
        if self.state.done {
            return Ok(None);
        }
        let status = self.master.reset().map_err(|e| {
            self.state.clear();
            e
        })?;
        if !status.presence() {
            self.state.clear();
            return Err(OneWireError::NoPresence);
        }
        let plan = self.state.plan();
        let pass = match self.master.search_pass(self.kind, &plan)? {
            Some(pass) => pass,
            None => {
                // Nothing answered the search command; with an alarm
                // search that simply means no device is alarming.
                self.state.clear();
                return Ok(None);
            }
        };
        self.state.absorb(&pass.rom, &pass.discrepancies);
        if pass.rom[0] == 0 {
            self.state.clear();
            return Ok(None);
        }
        if !OneWireCrc::validate(&pass.rom) {
            self.state.clear();
            return Err(OneWireError::CrcMismatch);
        }
        let rom = RomId::from_bytes(pass.rom);
        log::trace!(
            "search {:?}: found {rom}, branch point {}",
            self.kind,
            self.state.last_discrepancy
        );
        Ok(Some(rom))
    }

    /// Verifies that the device with the given ROM id is present.
    ///
    /// Seeds the walk with the candidate and a branch point of 64, runs
    /// a single round, and succeeds iff the same id comes back. The
    /// state is cleared afterwards either way.
    pub fn verify(&mut self, rom: RomId) -> OneWireResult<bool> {
        self.state.clear();
        self.state.rom = *rom.bytes();
        self.state.last_discrepancy = 64;
        let res = self.next();
        self.state.clear();
        Ok(res? == Some(rom))
    }
}
