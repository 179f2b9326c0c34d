//! Error taxonomy shared by every bus master and the layers above them.

use thiserror::Error;

/// One wire communication error type.
///
/// Kinds, not transports: each backend maps its own failure modes onto
/// these. Propagation policy lives at the call sites — CRC and presence
/// failures during a search clear the search state, framing errors on
/// the active master earn one blind retry, timeouts force a
/// resynchronizing reset before the next transaction.
#[derive(Debug, Error)]
pub enum OneWireError {
    /// The byte transport went away: short write, empty read, vanished
    /// device node.
    #[error("byte transport lost")]
    TransportLost,
    /// A deadline expired waiting for bytes or for a completion.
    #[error("timed out waiting for the bus")]
    Timeout,
    /// Unexpected byte count or mode mask in a bus-master reply.
    #[error("protocol framing: {0}")]
    ProtocolFraming(&'static str),
    /// A reset was issued and no slave answered with a presence pulse.
    #[error("no presence pulse after reset")]
    NoPresence,
    /// A ROM id or data packet failed CRC verification.
    #[error("CRC mismatch")]
    CrcMismatch,
    /// Two devices contended, or a read slot sampled `1/1` when a
    /// device was expected to answer.
    #[error("bus conflict")]
    BusConflict,
    /// The request was drained by a termination sentinel.
    #[error("request cancelled")]
    Cancelled,
    /// The operation is not implemented by this bus master.
    #[error("operation not supported by this bus master")]
    Unsupported,
    /// A printable ROM id failed to parse.
    #[error("malformed ROM id")]
    InvalidRomId,
    /// Transport-level I/O failure.
    #[error("transport I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl OneWireError {
    /// Short kind name for single-line diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            OneWireError::TransportLost => "TransportLost",
            OneWireError::Timeout => "Timeout",
            OneWireError::ProtocolFraming(_) => "ProtocolFraming",
            OneWireError::NoPresence => "NoPresence",
            OneWireError::CrcMismatch => "CrcMismatch",
            OneWireError::BusConflict => "BusConflict",
            OneWireError::Cancelled => "Cancelled",
            OneWireError::Unsupported => "Unsupported",
            OneWireError::InvalidRomId => "InvalidRomId",
            OneWireError::Io(_) => "Io",
        }
    }
}

/// Result alias for 1-Wire operations.
pub type OneWireResult<T> = Result<T, OneWireError>;
