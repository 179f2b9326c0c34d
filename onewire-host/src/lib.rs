#![deny(missing_docs)]

/*! # Host-side 1-Wire bus controller
 *
 * The layers above the wire: the executor that serializes all bus work
 * (in-line or through a worker thread with request/response queues),
 * the bus-controller façade slave drivers talk to, and the textual
 * bus-definition parsing that selects a backend.
 */

pub mod config;
pub mod controller;
pub mod executor;

pub use config::{BackendAddress, BusDefinition};
pub use controller::{BusController, BusSettings};
pub use executor::{
    AsyncExecutor, BusEvents, Completion, ExecutedTransaction, Request, SubmitHandle,
    SyncExecutor,
};
