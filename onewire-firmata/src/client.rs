//! The coprocessor client seam.

use std::time::Instant;

use onewire_bus::{OneWireResult, RomId};

/// One packaged bus transaction, sent to the coprocessor in a single
/// command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadRequest {
    /// Emit a reset pulse before anything else.
    pub reset: bool,
    /// Address one device, or everyone (skip-ROM) when absent.
    pub select: Option<RomId>,
    /// Bytes to transmit after selection.
    pub write: Vec<u8>,
    /// Bytes to collect after the write.
    pub read_len: usize,
    /// Coprocessor-side wait after the transaction.
    pub delay_ms: u64,
    /// The id the eventual read reply will carry:
    /// the target, or [`RomId::ZERO`] for skip-ROM.
    pub correlation: RomId,
}

/// Replies the coprocessor delivers asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmataReply {
    /// The device list answering a search request.
    SearchReply {
        /// Whether this answers an alarm search.
        alarm: bool,
        /// Every id the firmware walked to.
        devices: Vec<RomId>,
    },
    /// Data read for one addressed device.
    ReadReply {
        /// The id the request correlated on.
        rom: RomId,
        /// Raw reply bytes as the firmware reports them, echoes
        /// included.
        data: Vec<u8>,
    },
}

/// Client of a firmware coprocessor driving one 1-Wire pin.
///
/// The transport below this trait (an in-process client of the firmware
/// link) is out of scope; implementations surface
/// [`TransportLost`](onewire_bus::OneWireError::TransportLost) when the
/// link drops and leave reconnection to the host.
pub trait FirmataClient {
    /// The coprocessor pin this bus hangs off.
    fn pin(&self) -> u8;

    /// Enables 1-Wire on the pin. Called once at init.
    fn configure(&mut self) -> OneWireResult<()>;

    /// Fires a reset pulse. The firmware gives no synchronous answer.
    fn reset(&mut self) -> OneWireResult<()>;

    /// Starts a bus search; the device list arrives as a
    /// [`FirmataReply::SearchReply`].
    fn search(&mut self, alarm: bool) -> OneWireResult<()>;

    /// Submits one packaged transaction; any read data arrives as a
    /// [`FirmataReply::ReadReply`] correlated by
    /// [`OffloadRequest::correlation`].
    fn submit(&mut self, request: &OffloadRequest) -> OneWireResult<()>;

    /// Delivers the next pending reply, or `None` at the deadline.
    fn poll(&mut self, deadline: Instant) -> OneWireResult<Option<FirmataReply>>;

    /// Releases the firmware link.
    fn close(&mut self);
}
