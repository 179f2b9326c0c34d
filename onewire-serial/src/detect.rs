//! Active/passive auto-detection.
//!
//! A DS2480 answers its calibration dialogue; a passive adapter merely
//! echoes what the UART shaped. The probe classifies the reply and
//! downgrades to the DS9097 driver when the active chip never speaks.

use std::time::Duration;

use onewire_bus::{
    BusLevel, OneWireError, OneWireMaster, OneWireResult, OneWireStatus, RomId, SearchKind,
    SearchPass,
};

use crate::ds2480::{Ds2480, ResetReply};
use crate::ds9097::{Ds9097, PresenceEcho};
use crate::transport::{read_exact, ByteTransport, ReadBudget};

/// Calibration byte: a reset the chip uses to time the line.
const TIMING_BYTE: u8 = 0xc1;
/// Configuration probe written each detection round.
const PROBE: [u8; 5] = [0x17, 0x45, 0x5b, 0x0f, 0x91];
/// Rounds before the transport is declared unusable.
const PROBE_ROUNDS: usize = 100;
/// Pause between unclassifiable replies.
const PROBE_RETRY: Duration = Duration::from_millis(500);

/// DS2480 answering its first configuration dialogue.
const REPLY_ACTIVE_FRESH: [&[u8]; 2] = [&[0x16, 0x44, 0x5a, 0x00, 0x90], &[0x16, 0x44, 0x5a, 0x00, 0x93]];
/// DS2480 already configured, echoing the probe verbatim.
const REPLY_ACTIVE_AGAIN: &[u8] = &[0x17, 0x45, 0x5b, 0x0f, 0x91];
/// Passive adapters mangling the probe on the open line. The same
/// replies also show up with a leading null on some UARTs.
const REPLY_PASSIVE: [&[u8]; 2] = [&[0x17, 0x0a, 0x5b, 0x0f, 0x02], &[0x30, 0xf8, 0x00]];

/// Either serial bus master behind one detected transport.
pub enum SerialMaster<T> {
    /// DS2480-class active master.
    Active(Ds2480<T>),
    /// DS9097-class passive adapter.
    Passive(Ds9097<T>),
}

/// Reset status of whichever master answered.
pub enum SerialStatus {
    /// Active-master reset reply byte.
    Active(ResetReply),
    /// Passive-adapter reset echo.
    Passive(PresenceEcho),
}

impl OneWireStatus for SerialStatus {
    fn presence(&self) -> bool {
        match self {
            SerialStatus::Active(s) => s.presence(),
            SerialStatus::Passive(s) => s.presence(),
        }
    }

    fn alarming(&self) -> bool {
        match self {
            SerialStatus::Active(s) => s.alarming(),
            SerialStatus::Passive(s) => s.alarming(),
        }
    }

    fn short_circuit(&self) -> bool {
        match self {
            SerialStatus::Active(s) => s.short_circuit(),
            SerialStatus::Passive(s) => s.short_circuit(),
        }
    }
}

impl<T: ByteTransport> SerialMaster<T> {
    /// Human-readable backend name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SerialMaster::Active(_) => "DS2480",
            SerialMaster::Passive(_) => "DS9097",
        }
    }

    /// Releases the underlying transport.
    pub fn close(&mut self) {
        match self {
            SerialMaster::Active(m) => m.close(),
            SerialMaster::Passive(m) => m.close(),
        }
    }
}

impl<T: ByteTransport> OneWireMaster for SerialMaster<T> {
    type Status = SerialStatus;

    fn reset(&mut self) -> OneWireResult<SerialStatus> {
        match self {
            SerialMaster::Active(m) => m.reset().map(SerialStatus::Active),
            SerialMaster::Passive(m) => m.reset().map(SerialStatus::Passive),
        }
    }

    fn block(&mut self, data: &mut [u8]) -> OneWireResult<()> {
        match self {
            SerialMaster::Active(m) => m.block(data),
            SerialMaster::Passive(m) => m.block(data),
        }
    }

    fn search_pass(
        &mut self,
        kind: SearchKind,
        plan: &[u8; 8],
    ) -> OneWireResult<Option<SearchPass>> {
        match self {
            SerialMaster::Active(m) => m.search_pass(kind, plan),
            SerialMaster::Passive(m) => m.search_pass(kind, plan),
        }
    }

    fn set_level(&mut self, level: BusLevel) -> OneWireResult<()> {
        match self {
            SerialMaster::Active(m) => m.set_level(level),
            SerialMaster::Passive(m) => m.set_level(level),
        }
    }

    fn enumerate_offload(&mut self, kind: SearchKind) -> OneWireResult<Vec<RomId>> {
        match self {
            SerialMaster::Active(m) => m.enumerate_offload(kind),
            SerialMaster::Passive(m) => m.enumerate_offload(kind),
        }
    }
}

fn classify(reply: &[u8]) -> Option<bool> {
    if REPLY_ACTIVE_FRESH.contains(&reply) || reply == REPLY_ACTIVE_AGAIN {
        return Some(true);
    }
    if REPLY_PASSIVE.contains(&reply) {
        return Some(false);
    }
    if reply.first() == Some(&0x00) && classify(&reply[1..]) == Some(false) {
        return Some(false);
    }
    None
}

/// Probes the transport and wraps it in the master that answered.
///
/// The transport must be freshly opened at 9600 baud. Each round writes
/// the five-byte probe and classifies up to five reply bytes; garbage
/// earns a 500 ms pause and another round, and after 100 rounds the
/// transport is declared unusable.
pub fn detect<T: ByteTransport>(transport: T) -> OneWireResult<SerialMaster<T>> {
    detect_with(transport, PROBE_ROUNDS, PROBE_RETRY)
}

/// [`detect`] with an explicit round cap and retry pause.
pub fn detect_with<T: ByteTransport>(
    mut transport: T,
    rounds: usize,
    retry: Duration,
) -> OneWireResult<SerialMaster<T>> {
    transport.reset_errors()?;
    transport.write_all(&[TIMING_BYTE])?;
    // The calibration reply, if any, is noise for classification.
    let _ = read_exact(&mut transport, 1, &ReadBudget::bit_echo());
    for round in 0..rounds {
        transport.reset_errors()?;
        transport.write_all(&PROBE)?;
        // Short replies still classify: the 3-byte passive form.
        let reply = read_upto(&mut transport, 6)?;
        match classify(&reply) {
            Some(true) => {
                log::info!("detected DS2480 active master after {} round(s)", round + 1);
                return Ok(SerialMaster::Active(Ds2480::new(transport)));
            }
            Some(false) => {
                log::info!(
                    "detected DS9097 passive adapter after {} round(s)",
                    round + 1
                );
                return Ok(SerialMaster::Passive(Ds9097::new(transport)));
            }
            None => {
                log::debug!("probe round {}: unclassifiable reply {reply:02x?}", round + 1);
                std::thread::sleep(retry);
            }
        }
    }
    log::warn!("no usable reply after {rounds} probe rounds");
    Err(OneWireError::TransportLost)
}

/// Collects up to `max` reply bytes, returning whatever arrived within
/// the probe window.
fn read_upto<T: ByteTransport>(transport: &mut T, max: usize) -> OneWireResult<Vec<u8>> {
    std::thread::sleep(Duration::from_millis(40));
    let mut out = Vec::with_capacity(max);
    let window = std::time::Instant::now() + Duration::from_millis(200);
    while out.len() < max {
        let mut chunk = vec![0u8; max - out.len()];
        let n = transport.read(&mut chunk, window)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Ok(out)
}
