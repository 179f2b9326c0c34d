//! The device roster: which ROM ids are present, which are alarming.

use std::collections::BTreeSet;

use crate::rom::RomId;

/// The sets maintained by enumeration and alarm scanning.
///
/// Entries are replaced atomically between successive scans; readers get
/// snapshot copies. Every element is a CRC-valid [`RomId`] — the
/// enumerator refuses anything else.
#[derive(Debug, Clone, Default)]
pub struct DeviceRoster {
    present: BTreeSet<RomId>,
    alarmed: BTreeSet<RomId>,
}

/// Difference between two successive scans of the same set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    /// Ids seen now but not in the previous scan.
    pub added: Vec<RomId>,
    /// Ids from the previous scan that no longer answer.
    pub removed: Vec<RomId>,
}

impl RosterDiff {
    /// True when the scan changed nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl DeviceRoster {
    /// An empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the present set, in id order.
    pub fn present(&self) -> Vec<RomId> {
        self.present.iter().copied().collect()
    }

    /// Snapshot of the alarmed set, in id order.
    pub fn alarmed(&self) -> Vec<RomId> {
        self.alarmed.iter().copied().collect()
    }

    /// Whether `rom` was present at the last enumeration.
    pub fn contains(&self, rom: &RomId) -> bool {
        self.present.contains(rom)
    }

    /// Replaces the present set and reports the diff against the
    /// previous scan.
    pub fn replace_present(&mut self, scan: BTreeSet<RomId>) -> RosterDiff {
        let diff = RosterDiff {
            added: scan.difference(&self.present).copied().collect(),
            removed: self.present.difference(&scan).copied().collect(),
        };
        self.present = scan;
        diff
    }

    /// Replaces the alarmed set.
    pub fn replace_alarmed(&mut self, scan: BTreeSet<RomId>) {
        self.alarmed = scan;
    }

    /// Drops both sets.
    pub fn clear(&mut self) {
        self.present.clear();
        self.alarmed.clear();
    }
}
