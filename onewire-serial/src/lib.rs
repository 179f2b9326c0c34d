#![deny(missing_docs)]

/*! # Serial 1-Wire bus masters
 *
 * Two very different chips speak to the same logical bus over one host
 * serial device: the DS2480 active master frames commands and data on
 * a 9600-baud stream, while the DS9097 passive adapter lets the UART
 * itself shape bit slots at 115200 baud. [`detect`] probes a freshly
 * opened transport and returns whichever driver answered.
 */

pub use onewire_bus::{OneWireError, OneWireMaster, OneWireResult};

mod detect;
mod ds2480;
mod ds9097;
mod transport;

pub use detect::{detect, detect_with, SerialMaster, SerialStatus};
pub use ds2480::{escape_data, unescape_data, Ds2480, ResetReply};
pub use ds9097::{Ds9097, PresenceEcho};
pub use transport::{ByteTransport, SerialTransport};
