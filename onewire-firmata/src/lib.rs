#![deny(missing_docs)]

/*! # Firmware-offload 1-Wire bus master
 *
 * Here the wire work happens on a coprocessor: the host packages a
 * whole transaction (reset, selection, write, read, delay) into one
 * command, and results come back later as asynchronous replies tagged
 * with the ROM id they answer for. Skip-ROM transactions correlate on
 * the all-zero placeholder id.
 */

mod client;
mod master;

pub use client::{FirmataClient, FirmataReply, OffloadRequest};
pub use master::{FirmataMaster, OffloadStatus};
