//! Command constants for 1-Wire communication.

/// Command to match a specific ROM address in 1-Wire communication.
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Command to skip ROM addressing and select every device on the bus.
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Command to search for devices on the 1-Wire bus.
pub const ONEWIRE_SEARCH_CMD: u8 = 0xf0;

/// Command to search for devices in alarm state on the 1-Wire bus.
pub const ONEWIRE_CONDITIONAL_SEARCH_CMD: u8 = 0xec;

/// Temperature-conversion command understood by the thermometer
/// families. Broadcast after a skip-ROM by the periodic bus kick.
pub const ONEWIRE_CONVERT_T_CMD: u8 = 0x44;

/// Time-fill byte transmitted to open a read slot. Read slots are
/// master-initiated; the echo of this byte is the sampled line state.
pub const ONEWIRE_READ_SLOT: u8 = 0xff;
