#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use onewire_bus::{
    crc8, OneWireError, OneWireMaster, OneWireResult, OneWireStatus, RomId, SearchKind,
    SearchPass,
};

/// Shared observable state of a simulated bus: what is connected, what
/// went over the wire, and which failures to inject.
#[derive(Default)]
pub struct BusState {
    pub devices: Vec<RomId>,
    pub alarmed: Vec<RomId>,
    pub replies: VecDeque<u8>,
    pub wire: Vec<Vec<u8>>,
    pub resets: usize,
    /// Next reset reports an alarming presence.
    pub alarming_presence: bool,
    /// Presence forced off regardless of the device list.
    pub force_absent: bool,
    /// The next block fails with this error.
    pub fail_next_block: Option<OneWireError>,
    /// Every block stalls this long, for serialization tests.
    pub block_stall: Duration,
}

/// A master over shared state, cloneable for inspection from the test
/// thread while the worker owns the master.
pub struct TestMaster {
    pub state: Arc<Mutex<BusState>>,
}

pub struct TestStatus {
    presence: bool,
    alarming: bool,
}

impl OneWireStatus for TestStatus {
    fn presence(&self) -> bool {
        self.presence
    }

    fn alarming(&self) -> bool {
        self.alarming
    }
}

pub fn rom(family: u8, serial: [u8; 6]) -> RomId {
    let mut bytes = [0u8; 8];
    bytes[0] = family;
    bytes[1..7].copy_from_slice(&serial);
    bytes[7] = crc8(&bytes[..7]);
    RomId::from_bytes(bytes)
}

impl TestMaster {
    pub fn new(devices: Vec<RomId>) -> (Self, Arc<Mutex<BusState>>) {
        let state = Arc::new(Mutex::new(BusState {
            devices,
            ..BusState::default()
        }));
        (
            TestMaster {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl OneWireMaster for TestMaster {
    type Status = TestStatus;

    fn reset(&mut self) -> OneWireResult<TestStatus> {
        let mut state = self.state.lock().unwrap();
        state.resets += 1;
        let alarming = state.alarming_presence;
        Ok(TestStatus {
            presence: !state.force_absent && (!state.devices.is_empty() || alarming),
            alarming,
        })
    }

    fn block(&mut self, data: &mut [u8]) -> OneWireResult<()> {
        let stall = {
            let mut state = self.state.lock().unwrap();
            if let Some(error) = state.fail_next_block.take() {
                return Err(error);
            }
            for byte in data.iter_mut() {
                if *byte == 0xff {
                    if let Some(reply) = state.replies.pop_front() {
                        *byte = reply;
                    }
                }
            }
            state.wire.push(data.to_vec());
            state.block_stall
        };
        if stall > Duration::ZERO {
            std::thread::sleep(stall);
        }
        Ok(())
    }

    fn search_pass(
        &mut self,
        kind: SearchKind,
        plan: &[u8; 8],
    ) -> OneWireResult<Option<SearchPass>> {
        let state = self.state.lock().unwrap();
        let set = match kind {
            SearchKind::Discover => &state.devices,
            SearchKind::Alarm => &state.alarmed,
        };
        let mut candidates: Vec<[u8; 8]> = set.iter().map(|r| *r.bytes()).collect();
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
                return Ok(None);
            }
        }
        Ok(Some(SearchPass { rom, discrepancies }))
    }
}
