//! Serialized execution of bus work.
//!
//! One logical bus is one shared resource: every operation funnels
//! through a single engine that owns the master and the enumerator.
//! The synchronous executor runs the engine on the caller's thread; the
//! asynchronous one feeds it from a request queue on a dedicated worker
//! and reports completions back through a response queue.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use onewire_bus::{
    Enumerator, OneWireError, OneWireMaster, OneWireResult, ResetOutcome, RomId, RosterDiff,
    Transaction,
};

/// Extra wall-clock budget a transaction gets on top of its own
/// `delay_ms` before the worker declares it timed out.
const BACKEND_BUDGET: Duration = Duration::from_secs(3);

/// Wait applied after the kick broadcast, covering the slowest
/// conversion time on the bus.
const KICK_SETTLE_MS: u64 = 500;

/// A unit of work accepted by either executor flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Run one composed transaction.
    Execute(Transaction),
    /// Full enumeration into the roster.
    Discover,
    /// Alarm scan into the roster.
    Alarms,
    /// Seeded single-round presence check.
    Verify(RomId),
    /// Bus reset, reporting presence and alarm state.
    Reset,
    /// Broadcast the temperature-conversion kick.
    Kick,
    /// Termination sentinel: drain the queue and close the transport.
    Shutdown,
}

impl Request {
    /// The operation name used in diagnostics.
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Execute(_) => "execute",
            Request::Discover => "discover",
            Request::Alarms => "alarms",
            Request::Verify(_) => "verify",
            Request::Reset => "reset",
            Request::Kick => "kick",
            Request::Shutdown => "shutdown",
        }
    }
}

/// A finished transaction as delivered to completion callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTransaction {
    /// The opaque token from the submitted transaction.
    pub context: u64,
    /// Whether the transaction began with a reset.
    pub reset: bool,
    /// The addressed device, if any.
    pub target: Option<RomId>,
    /// The written payload.
    pub write: Vec<u8>,
    /// How many bytes were requested.
    pub read_len: usize,
    /// The bytes read back, exactly `read_len` of them.
    pub data: Vec<u8>,
}

/// The outcome the worker publishes for one request.
#[derive(Debug)]
pub enum Completion {
    /// A transaction finished with its read data.
    Executed(ExecutedTransaction),
    /// Enumeration finished; the roster diff rides along.
    Discovered {
        /// Snapshot of the present set.
        present: Vec<RomId>,
        /// What changed against the previous scan.
        diff: RosterDiff,
    },
    /// Alarm scan finished.
    Alarmed(Vec<RomId>),
    /// Presence check finished.
    Verified(RomId, bool),
    /// Reset finished.
    ResetDone(ResetOutcome),
    /// Kick broadcast finished (failures are logged, not reported).
    Kicked,
    /// A request failed.
    Failed {
        /// Which operation failed.
        operation: &'static str,
        /// Why.
        error: OneWireError,
    },
    /// A request was drained by the termination sentinel.
    Cancelled,
}

/// Completion callbacks dispatched on the client context by
/// [`AsyncExecutor::poll`].
#[allow(unused_variables)]
pub trait BusEvents {
    /// Enumeration finished.
    fn after_search(&mut self, present: &[RomId], diff: &RosterDiff) {}
    /// Alarm scan finished.
    fn after_alarms(&mut self, alarmed: &[RomId]) {}
    /// A transaction finished.
    fn after_execute(&mut self, done: &ExecutedTransaction) {}
    /// A presence check finished.
    fn after_verify(&mut self, rom: RomId, present: bool) {}
    /// A reset finished.
    fn after_reset(&mut self, outcome: ResetOutcome) {}
    /// A request failed.
    fn after_failure(&mut self, operation: &str, error: &OneWireError) {}
}

/// The engine both executor flavors share: one master, one enumerator,
/// strict one-request-at-a-time semantics.
pub struct Engine<M> {
    master: M,
    enumerator: Enumerator,
    needs_reset: bool,
}

impl<M: OneWireMaster> Engine<M> {
    /// Wraps a master with a fresh roster.
    pub fn new(master: M) -> Self {
        Engine {
            master,
            enumerator: Enumerator::new(),
            needs_reset: false,
        }
    }

    /// The wrapped master.
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Runs one request to completion.
    pub fn run(&mut self, request: Request) -> Completion {
        if self.needs_reset {
            // A timed-out transaction may have left slaves mid-frame;
            // resynchronize before touching the bus again.
            self.needs_reset = false;
            if let Err(e) = self.master.reset() {
                log::warn!("resynchronizing reset failed: {e}");
            }
        }
        let operation = request.operation();
        match request {
            Request::Execute(txn) => self.execute(txn),
            Request::Discover => match self.enumerator.discover(&mut self.master) {
                Ok(diff) => Completion::Discovered {
                    present: self.enumerator.roster().present(),
                    diff,
                },
                Err(error) => self.fail(operation, error),
            },
            Request::Alarms => match self.enumerator.alarm_scan(&mut self.master) {
                Ok(alarmed) => Completion::Alarmed(alarmed),
                Err(error) => self.fail(operation, error),
            },
            Request::Verify(rom) => match self.enumerator.verify(&mut self.master, rom) {
                Ok(present) => Completion::Verified(rom, present),
                Err(error) => self.fail(operation, error),
            },
            Request::Reset => match self.master.reset() {
                Ok(status) => Completion::ResetDone(ResetOutcome::from_status(&status)),
                Err(error) => self.fail(operation, error),
            },
            Request::Kick => {
                let txn = Transaction::new(None)
                    .with_write([onewire_bus::consts::ONEWIRE_CONVERT_T_CMD])
                    .with_delay_ms(KICK_SETTLE_MS)
                    .allowing_absent();
                if let Err(e) = self.master.execute(&txn) {
                    log::info!("kick broadcast failed: {e}");
                }
                Completion::Kicked
            }
            Request::Shutdown => Completion::Cancelled,
        }
    }

    fn execute(&mut self, txn: Transaction) -> Completion {
        let deadline = Instant::now() + Duration::from_millis(txn.delay_ms) + BACKEND_BUDGET;
        let result = self.master.execute(&txn);
        let overran = Instant::now() > deadline;
        match result {
            Ok(_) if overran => self.fail("execute", OneWireError::Timeout),
            Ok(data) => Completion::Executed(ExecutedTransaction {
                context: txn.context,
                reset: txn.reset,
                target: txn.target,
                write: txn.write,
                read_len: txn.read_len,
                data,
            }),
            Err(error) => self.fail("execute", error),
        }
    }

    fn fail(&mut self, operation: &'static str, error: OneWireError) -> Completion {
        if matches!(error, OneWireError::Timeout) {
            self.needs_reset = true;
        }
        log::debug!("{operation} failed: {error}");
        Completion::Failed { operation, error }
    }
}

/// The synchronous flavor: the caller's context blocks until the
/// backend returns. The natural fit for the in-line serial masters.
pub struct SyncExecutor<M> {
    engine: Engine<M>,
}

impl<M: OneWireMaster> SyncExecutor<M> {
    /// Wraps a master.
    pub fn new(master: M) -> Self {
        SyncExecutor {
            engine: Engine::new(master),
        }
    }

    /// Runs one request in-line.
    pub fn run(&mut self, request: Request) -> Completion {
        self.engine.run(request)
    }

    /// The wrapped master.
    pub fn master_mut(&mut self) -> &mut M {
        self.engine.master_mut()
    }
}

/// A handle for submitting requests from any thread.
///
/// Requests from one handle are processed in submission order; the
/// single worker imposes a total order across handles.
#[derive(Clone)]
pub struct SubmitHandle {
    requests: Sender<Request>,
}

impl SubmitHandle {
    /// Enqueues a request. Fails with
    /// [`OneWireError::Cancelled`] once the worker has shut down.
    pub fn submit(&self, request: Request) -> OneWireResult<()> {
        self.requests
            .send(request)
            .map_err(|_| OneWireError::Cancelled)
    }
}

/// The asynchronous flavor: a request queue feeding a single worker
/// that owns the master, with completions published to a response
/// queue. The natural fit for the firmware master and for long
/// conversions.
pub struct AsyncExecutor {
    requests: Sender<Request>,
    completions: Receiver<Completion>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncExecutor {
    /// Moves `master` onto a fresh worker thread.
    pub fn spawn<M>(master: M) -> Self
    where
        M: OneWireMaster + Send + 'static,
    {
        let (req_tx, req_rx) = channel::<Request>();
        let (done_tx, done_rx) = channel::<Completion>();
        let worker = std::thread::Builder::new()
            .name("onewire-bus".into())
            .spawn(move || worker_loop(Engine::new(master), req_rx, done_tx))
            .expect("spawning the bus worker");
        AsyncExecutor {
            requests: req_tx,
            completions: done_rx,
            worker: Some(worker),
        }
    }

    /// A cloneable submission handle for client threads.
    pub fn handle(&self) -> SubmitHandle {
        SubmitHandle {
            requests: self.requests.clone(),
        }
    }

    /// Enqueues a request from the owning context.
    pub fn submit(&self, request: Request) -> OneWireResult<()> {
        self.requests
            .send(request)
            .map_err(|_| OneWireError::Cancelled)
    }

    /// Dispatches every completion already in the response queue onto
    /// `events`, returning how many were delivered. Never blocks.
    pub fn poll(&mut self, events: &mut dyn BusEvents) -> usize {
        let mut delivered = 0;
        loop {
            match self.completions.try_recv() {
                Ok(completion) => {
                    dispatch(&completion, events);
                    delivered += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        delivered
    }

    /// Blocks for the next completion, up to `timeout`.
    pub fn wait(&mut self, timeout: Duration) -> Option<Completion> {
        self.completions.recv_timeout(timeout).ok()
    }

    /// Sends the termination sentinel and joins the worker. Requests
    /// still queued behind the sentinel are reported as
    /// [`Completion::Cancelled`] and dropped.
    pub fn shutdown(mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for AsyncExecutor {
    fn drop(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Routes one completion to its callback.
pub fn dispatch(completion: &Completion, events: &mut dyn BusEvents) {
    match completion {
        Completion::Executed(done) => events.after_execute(done),
        Completion::Discovered { present, diff } => events.after_search(present, diff),
        Completion::Alarmed(alarmed) => events.after_alarms(alarmed),
        Completion::Verified(rom, present) => events.after_verify(*rom, *present),
        Completion::ResetDone(outcome) => events.after_reset(*outcome),
        Completion::Kicked => {}
        Completion::Failed { operation, error } => events.after_failure(operation, error),
        Completion::Cancelled => {}
    }
}

/// Worker state machine: idle, running one request, closed by the
/// sentinel. Completions go out in processing order, which on a single
/// worker equals enqueue order.
fn worker_loop<M: OneWireMaster>(
    mut engine: Engine<M>,
    requests: Receiver<Request>,
    completions: Sender<Completion>,
) {
    while let Ok(request) = requests.recv() {
        if matches!(request, Request::Shutdown) {
            // Drain whatever is queued behind the sentinel.
            while let Ok(drained) = requests.try_recv() {
                log::debug!("cancelling queued {}", drained.operation());
                let _ = completions.send(Completion::Cancelled);
            }
            let _ = completions.send(Completion::Cancelled);
            break;
        }
        let completion = engine.run(request);
        if completions.send(completion).is_err() {
            // Nobody is listening any more.
            break;
        }
    }
    // Dropping the engine drops the master, which releases its
    // transport.
    log::debug!("bus worker closed");
}
