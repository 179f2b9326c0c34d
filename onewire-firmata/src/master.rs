//! [`OneWireMaster`] over a [`FirmataClient`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use onewire_bus::{
    OneWireError, OneWireMaster, OneWireResult, OneWireStatus, RomId, SearchKind, SearchPass,
    Transaction,
};

use crate::client::{FirmataClient, FirmataReply, OffloadRequest};

/// Base wait for a correlated reply, on top of the transaction's own
/// delay budget.
const REPLY_BUDGET: Duration = Duration::from_secs(2);

/// Leading echo bytes in a firmware read reply: the selection command
/// plus the eight ROM bytes. The written payload echoes after them.
const SELECT_ECHO_LEN: usize = 9;

/// Status of a firmware-side reset.
///
/// The coprocessor fires the pulse without reporting the presence
/// sample back, so this always claims presence; absence shows up later
/// as a missing read reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffloadStatus;

impl OneWireStatus for OffloadStatus {
    fn presence(&self) -> bool {
        true
    }
}

/// A bus master whose transactions run on a firmware coprocessor.
pub struct FirmataMaster<C> {
    client: C,
    /// Replies that arrived while waiting for a different correlation.
    pending: VecDeque<FirmataReply>,
}

impl<C: FirmataClient> FirmataMaster<C> {
    /// Wraps a client and enables 1-Wire on its pin.
    pub fn new(mut client: C) -> OneWireResult<Self> {
        client.configure()?;
        log::debug!("firmware 1-Wire enabled on pin {}", client.pin());
        Ok(FirmataMaster {
            client,
            pending: VecDeque::new(),
        })
    }

    /// The coprocessor pin this bus hangs off.
    pub fn pin(&self) -> u8 {
        self.client.pin()
    }

    /// Releases the firmware link.
    pub fn close(&mut self) {
        self.client.close();
    }

    /// Next reply, draining the stash before polling the client.
    fn next_reply(&mut self, deadline: Instant) -> OneWireResult<Option<FirmataReply>> {
        if let Some(reply) = self.pending.pop_front() {
            return Ok(Some(reply));
        }
        self.client.poll(deadline)
    }

    /// Waits for the search reply of the requested flavor; read replies
    /// arriving in between are stashed, not dropped.
    fn await_search(&mut self, alarm: bool, deadline: Instant) -> OneWireResult<Vec<RomId>> {
        let mut stash = VecDeque::new();
        let devices = loop {
            match self.next_reply(deadline)? {
                Some(FirmataReply::SearchReply { alarm: a, devices }) if a == alarm => {
                    break devices;
                }
                Some(other) => stash.push_back(other),
                None => {
                    self.pending.append(&mut stash);
                    return Err(OneWireError::Timeout);
                }
            }
        };
        self.pending.append(&mut stash);
        Ok(devices)
    }

    /// Waits for the read reply correlated to `rom`.
    fn await_read(&mut self, rom: RomId, deadline: Instant) -> OneWireResult<Vec<u8>> {
        let mut stash = VecDeque::new();
        let data = loop {
            match self.next_reply(deadline)? {
                Some(FirmataReply::ReadReply { rom: r, data }) if r == rom => break data,
                Some(other) => stash.push_back(other),
                None => {
                    self.pending.append(&mut stash);
                    return Err(OneWireError::Timeout);
                }
            }
        };
        self.pending.append(&mut stash);
        Ok(data)
    }

    /// Cuts the requested read slice out of a raw firmware reply.
    ///
    /// The firmware echoes the selection frame and the written payload
    /// ahead of the read data; stripping that `9 + write_len` prefix is
    /// a quirk of this backend, not a bus rule. Some firmware builds
    /// send the read data bare, so an exact-length reply passes as-is.
    fn trim_reply(raw: Vec<u8>, write_len: usize, read_len: usize) -> OneWireResult<Vec<u8>> {
        let offset = SELECT_ECHO_LEN + write_len;
        if raw.len() >= offset + read_len {
            return Ok(raw[offset..offset + read_len].to_vec());
        }
        if raw.len() == read_len {
            return Ok(raw);
        }
        log::warn!(
            "firmware reply of {} byte(s), wanted {read_len} (+{offset} echo)",
            raw.len()
        );
        Err(OneWireError::ProtocolFraming("firmware reply length"))
    }
}

impl<C: FirmataClient> OneWireMaster for FirmataMaster<C> {
    type Status = OffloadStatus;

    fn reset(&mut self) -> OneWireResult<OffloadStatus> {
        self.client.reset()?;
        Ok(OffloadStatus)
    }

    /// Raw block I/O never reaches the firmware link; whole
    /// transactions do.
    fn block(&mut self, _data: &mut [u8]) -> OneWireResult<()> {
        Err(OneWireError::Unsupported)
    }

    /// The firmware walks the search tree itself; there is no
    /// incremental round to run.
    fn search_pass(
        &mut self,
        _kind: SearchKind,
        _plan: &[u8; 8],
    ) -> OneWireResult<Option<SearchPass>> {
        Err(OneWireError::Unsupported)
    }

    fn enumerate_offload(&mut self, kind: SearchKind) -> OneWireResult<Vec<RomId>> {
        let alarm = kind == SearchKind::Alarm;
        self.client.search(alarm)?;
        self.await_search(alarm, Instant::now() + REPLY_BUDGET)
    }

    fn execute(&mut self, txn: &Transaction) -> OneWireResult<Vec<u8>> {
        let correlation = txn.target.unwrap_or(RomId::ZERO);
        let request = OffloadRequest {
            reset: txn.reset,
            select: txn.target,
            write: txn.write.clone(),
            read_len: txn.read_len,
            delay_ms: txn.delay_ms,
            correlation,
        };
        self.client.submit(&request)?;
        if txn.read_len == 0 {
            // Nothing will be reported back; the coprocessor runs the
            // write and the delay on its own clock.
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + REPLY_BUDGET + Duration::from_millis(txn.delay_ms);
        let raw = self.await_read(correlation, deadline)?;
        Self::trim_reply(raw, txn.write.len(), txn.read_len)
    }
}
