//! The unit of work dispatched against the bus.

use crate::rom::RomId;

/// A composed bus transaction: reset, selection, write, read, delay.
///
/// Every slave-driver interaction reduces to one of these; the executor
/// serializes them against the single-threaded bus and returns the read
/// slice to the completion callback together with the opaque `context`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Emit a 1-Wire reset and require a presence pulse first.
    pub reset: bool,
    /// Address one device (match-ROM), or everyone (skip-ROM) if absent.
    pub target: Option<RomId>,
    /// Bytes transmitted after selection.
    pub write: Vec<u8>,
    /// Bytes collected after the write, each opened by a `0xff` fill.
    pub read_len: usize,
    /// Mandatory wait after the transaction, for slave-side conversion
    /// times.
    pub delay_ms: u64,
    /// Opaque token returned verbatim to the completion callback.
    pub context: u64,
    /// Tolerate a missing presence pulse on reset. Off by default; a
    /// silent bus is an error for addressed transactions.
    pub allow_absent: bool,
}

impl Transaction {
    /// A reset-and-select transaction with no payload.
    pub fn new(target: Option<RomId>) -> Self {
        Transaction {
            reset: true,
            target,
            write: Vec::new(),
            read_len: 0,
            delay_ms: 0,
            context: 0,
            allow_absent: false,
        }
    }

    /// Sets the bytes written after selection.
    pub fn with_write(mut self, write: impl Into<Vec<u8>>) -> Self {
        self.write = write.into();
        self
    }

    /// Sets the number of echo bytes collected after the write.
    pub fn with_read(mut self, read_len: usize) -> Self {
        self.read_len = read_len;
        self
    }

    /// Sets the post-transaction delay.
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Sets the opaque completion token.
    pub fn with_context(mut self, context: u64) -> Self {
        self.context = context;
        self
    }

    /// Skips the leading reset. The selection byte is still emitted.
    pub fn without_reset(mut self) -> Self {
        self.reset = false;
        self
    }

    /// Tolerates an empty bus on reset.
    pub fn allowing_absent(mut self) -> Self {
        self.allow_absent = true;
        self
    }
}
