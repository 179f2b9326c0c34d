//! Drives the search state machine and maintains the device roster.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::{OneWireError, OneWireResult},
    rom::RomId,
    roster::{DeviceRoster, RosterDiff},
    search::{OneWireSearch, SearchKind, SearchState},
    traits::OneWireMaster,
};

/// Upper bound on search rounds per scan. A healthy bus carries on the
/// order of a hundred slaves; a misbehaving one must not spin forever.
const ROUND_CAP: usize = 150;

/// How many CRC-failed rounds a scan survives before surfacing the
/// error. Each failure restarts the walk from a cleared state.
const CRC_RETRY_CAP: usize = 3;

/// Enumerates the bus in discover or alarm mode and keeps the roster.
///
/// Owns the [`SearchState`] for the sequence in flight; the roster is
/// written only here and read by clients through snapshots.
#[derive(Debug, Default)]
pub struct Enumerator {
    state: SearchState,
    roster: DeviceRoster,
    families: BTreeMap<u8, usize>,
}

impl Enumerator {
    /// A fresh enumerator with an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// The roster as of the last scans.
    pub fn roster(&self) -> &DeviceRoster {
        &self.roster
    }

    /// Devices per family as of the last discovery.
    pub fn families(&self) -> &BTreeMap<u8, usize> {
        &self.families
    }

    /// Full enumeration. Replaces the present set and returns the diff
    /// against the previous scan.
    pub fn discover<M: OneWireMaster>(&mut self, master: &mut M) -> OneWireResult<RosterDiff> {
        let scan = self.scan(master, SearchKind::Discover)?;
        self.families.clear();
        for rom in &scan {
            let n = self.families.entry(rom.family()).or_insert(0);
            if *n == 0 {
                log::debug!("family {:02X} appears on the bus", rom.family());
            }
            *n += 1;
        }
        let diff = self.roster.replace_present(scan);
        for rom in &diff.added {
            log::info!("device {rom} joined the bus");
        }
        for rom in &diff.removed {
            log::info!("device {rom} left the bus");
        }
        Ok(diff)
    }

    /// Alarm scan. Replaces the alarmed set and returns its snapshot.
    pub fn alarm_scan<M: OneWireMaster>(&mut self, master: &mut M) -> OneWireResult<Vec<RomId>> {
        let scan = self.scan(master, SearchKind::Alarm)?;
        self.roster.replace_alarmed(scan);
        let alarmed = self.roster.alarmed();
        if !alarmed.is_empty() {
            log::info!("{} device(s) alarming", alarmed.len());
        }
        Ok(alarmed)
    }

    /// Seeded single-round presence check for one id.
    ///
    /// Masters without an incremental search (firmware offload) answer
    /// through a full enumeration instead.
    pub fn verify<M: OneWireMaster>(
        &mut self,
        master: &mut M,
        rom: RomId,
    ) -> OneWireResult<bool> {
        let mut state = SearchState::new();
        match OneWireSearch::new(master, SearchKind::Discover, &mut state).verify(rom) {
            Err(OneWireError::Unsupported) => {
                let found = master.enumerate_offload(SearchKind::Discover)?;
                Ok(found.contains(&rom))
            }
            other => other,
        }
    }

    fn scan<M: OneWireMaster>(
        &mut self,
        master: &mut M,
        kind: SearchKind,
    ) -> OneWireResult<BTreeSet<RomId>> {
        match master.enumerate_offload(kind) {
            Ok(found) => {
                let mut scan = BTreeSet::new();
                for rom in found {
                    if !rom.is_valid() {
                        return Err(OneWireError::CrcMismatch);
                    }
                    scan.insert(rom);
                }
                return Ok(scan);
            }
            Err(OneWireError::Unsupported) => {}
            Err(e) => return Err(e),
        }

        let mut scan = BTreeSet::new();
        let mut crc_failures = 0;
        self.state.clear();
        for round in 0..ROUND_CAP {
            let mut search = OneWireSearch::new(master, kind, &mut self.state);
            match search.next() {
                Ok(Some(rom)) => {
                    scan.insert(rom);
                }
                Ok(None) => return Ok(scan),
                Err(OneWireError::NoPresence) => {
                    // Empty bus: nothing to enumerate. Presence loss
                    // mid-walk is logged and ends the scan with what we
                    // have; the next scan starts fresh anyway.
                    if !scan.is_empty() {
                        log::warn!("presence lost after {round} search round(s)");
                    }
                    return Ok(scan);
                }
                Err(OneWireError::CrcMismatch) => {
                    crc_failures += 1;
                    if crc_failures > CRC_RETRY_CAP {
                        return Err(OneWireError::CrcMismatch);
                    }
                    // State is already cleared; the walk restarts and
                    // the set union keeps the CRC-checked earlier finds.
                    log::warn!("search round failed CRC, restarting walk");
                }
                Err(e) => return Err(e),
            }
        }
        log::warn!("search round cap reached with {} device(s)", scan.len());
        Ok(scan)
    }
}
