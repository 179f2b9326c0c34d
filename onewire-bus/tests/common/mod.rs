#![allow(dead_code)]

use std::collections::VecDeque;

use onewire_bus::{
    OneWireError, OneWireMaster, OneWireResult, OneWireStatus, RomId, SearchKind, SearchPass,
};

/// A simulated multi-drop bus. Search slots follow the open-drain
/// wired-AND rule over every participating device; block I/O echoes
/// writes and serves queued reply bytes into read slots.
pub struct SimBus {
    pub devices: Vec<RomId>,
    pub alarmed: Vec<RomId>,
    pub replies: VecDeque<u8>,
    /// Every block frame as it appeared on the wire, post-echo.
    pub wire_log: Vec<Vec<u8>>,
    pub resets: usize,
}

pub struct SimStatus {
    presence: bool,
    alarming: bool,
}

impl OneWireStatus for SimStatus {
    fn presence(&self) -> bool {
        self.presence
    }

    fn alarming(&self) -> bool {
        self.alarming
    }
}

impl SimBus {
    pub fn new(devices: Vec<RomId>) -> Self {
        SimBus {
            devices,
            alarmed: Vec::new(),
            replies: VecDeque::new(),
            wire_log: Vec::new(),
            resets: 0,
        }
    }

    /// Builds a CRC-valid id from a family and six serial bytes.
    pub fn rom(family: u8, serial: [u8; 6]) -> RomId {
        let mut bytes = [0u8; 8];
        bytes[0] = family;
        bytes[1..7].copy_from_slice(&serial);
        bytes[7] = onewire_bus::crc8(&bytes[..7]);
        RomId::from_bytes(bytes)
    }

    fn participants(&self, kind: SearchKind) -> Vec<[u8; 8]> {
        let set = match kind {
            SearchKind::Discover => &self.devices,
            SearchKind::Alarm => &self.alarmed,
        };
        set.iter().map(|r| *r.bytes()).collect()
    }
}

impl OneWireMaster for SimBus {
    type Status = SimStatus;

    fn reset(&mut self) -> OneWireResult<SimStatus> {
        self.resets += 1;
        Ok(SimStatus {
            presence: !self.devices.is_empty(),
            alarming: !self.alarmed.is_empty(),
        })
    }

    fn block(&mut self, data: &mut [u8]) -> OneWireResult<()> {
        for byte in data.iter_mut() {
            if *byte == 0xff {
                if let Some(reply) = self.replies.pop_front() {
                    *byte = reply;
                }
            }
        }
        self.wire_log.push(data.to_vec());
        Ok(())
    }

    fn search_pass(
        &mut self,
        kind: SearchKind,
        plan: &[u8; 8],
    ) -> OneWireResult<Option<SearchPass>> {
        let mut candidates = self.participants(kind);
        if candidates.is_empty() {
            return Ok(None);
        }
        let mut rom = [0u8; 8];
        let mut discrepancies = [0u8; 8];
        for bit in 1..=64u8 {
            let idx = ((bit - 1) / 8) as usize;
            let mask = 1u8 << ((bit - 1) % 8);
            let id_bit = candidates.iter().all(|r| r[idx] & mask != 0);
            let cmp_id_bit = candidates.iter().all(|r| r[idx] & mask == 0);
            if id_bit && cmp_id_bit {
                return Ok(None);
            }
            let dir = if id_bit != cmp_id_bit {
                id_bit
            } else {
                discrepancies[idx] |= mask;
                plan[idx] & mask != 0
            };
            if dir {
                rom[idx] |= mask;
            }
            candidates.retain(|r| (r[idx] & mask != 0) == dir);
            if candidates.is_empty() {
                // The chosen branch holds no device; every later slot
                // samples 1/1.
                return Ok(None);
            }
        }
        Ok(Some(SearchPass { rom, discrepancies }))
    }
}

/// A master that supports nothing; for probing fallback paths.
pub struct DeadBus;

impl OneWireMaster for DeadBus {
    type Status = SimStatus;

    fn reset(&mut self) -> OneWireResult<SimStatus> {
        Err(OneWireError::TransportLost)
    }

    fn block(&mut self, _data: &mut [u8]) -> OneWireResult<()> {
        Err(OneWireError::TransportLost)
    }

    fn search_pass(
        &mut self,
        _kind: SearchKind,
        _plan: &[u8; 8],
    ) -> OneWireResult<Option<SearchPass>> {
        Err(OneWireError::TransportLost)
    }
}
