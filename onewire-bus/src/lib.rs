#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod consts;
mod crc;
mod enumerator;
mod error;
mod rom;
mod roster;
mod search;
mod traits;
mod transaction;

pub use consts::{ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD};
pub use crc::{crc16, crc16_verify, crc8, crc8_verify, OneWireCrc};
pub use enumerator::Enumerator;
pub use error::{OneWireError, OneWireResult};
pub use rom::RomId;
pub use roster::{DeviceRoster, RosterDiff};
pub use search::{OneWireSearch, SearchKind, SearchState};
pub use traits::{BusLevel, OneWireMaster, OneWireStatus, ResetOutcome, SearchPass};
pub use transaction::Transaction;
