//! The bus-controller façade exposed to slave drivers and host code.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use onewire_bus::{OneWireError, OneWireMaster, OneWireResult, ResetOutcome, RomId, Transaction};

use crate::executor::{
    dispatch, AsyncExecutor, BusEvents, Completion, Request, SubmitHandle, SyncExecutor,
};

/// Floor for the kick cadence.
const MIN_KICK_INTERVAL: Duration = Duration::from_secs(15);

/// How long a façade call waits for its completion on the async driver.
const COMPLETION_BUDGET: Duration = Duration::from_secs(60);

/// One receive slice while waiting; keeps shutdown responsive.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Per-bus policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusSettings {
    /// Cadence of the periodic kick. Floored at 15 s.
    pub kick_interval: Duration,
    /// Whether an alarming reset schedules an alarm scan.
    pub follow_alarms: bool,
    /// Whether this installation broadcasts the conversion kick at all.
    pub kick_enabled: bool,
}

impl Default for BusSettings {
    fn default() -> Self {
        BusSettings {
            kick_interval: Duration::from_secs(300),
            follow_alarms: false,
            kick_enabled: false,
        }
    }
}

enum Driver<M> {
    Sync(SyncExecutor<M>),
    Async(AsyncExecutor),
}

/// Process-wide bus-facing state: the driver, the last roster snapshot,
/// the kick schedule and the sticky alarm flag.
pub struct BusController<M> {
    name: String,
    driver: Driver<M>,
    settings: BusSettings,
    alarmed: bool,
    present: Vec<RomId>,
    next_kick: Instant,
    inbox: VecDeque<Completion>,
}

impl<M: OneWireMaster> BusController<M> {
    /// A controller running the master in-line on the caller's thread.
    /// The fit for the serial masters, which complete synchronously.
    pub fn new_sync(name: impl Into<String>, master: M, settings: BusSettings) -> Self {
        Self::with_driver(name.into(), Driver::Sync(SyncExecutor::new(master)), settings)
    }

    fn with_driver(name: String, driver: Driver<M>, mut settings: BusSettings) -> Self {
        settings.kick_interval = settings.kick_interval.max(MIN_KICK_INTERVAL);
        let next_kick = Instant::now() + settings.kick_interval;
        log::info!(
            "bus {name}: kick {} every {:?}, follow alarms {}",
            if settings.kick_enabled { "on" } else { "off" },
            settings.kick_interval,
            settings.follow_alarms,
        );
        BusController {
            name,
            driver,
            settings,
            alarmed: false,
            present: Vec::new(),
            next_kick,
            inbox: VecDeque::new(),
        }
    }

    /// The configured bus name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sticky alarm flag as last observed on a reset.
    pub fn alarm_pending(&self) -> bool {
        self.alarmed
    }

    /// Snapshot of the present set from the last discovery.
    pub fn devices(&self) -> &[RomId] {
        &self.present
    }

    /// Current policy knobs.
    pub fn settings(&self) -> BusSettings {
        self.settings
    }

    /// Adjusts the kick cadence and alarm policy. Intervals under 15 s
    /// are raised to the floor.
    pub fn set(&mut self, interval: Duration, follow_alarms: bool) {
        if interval < MIN_KICK_INTERVAL {
            log::warn!(
                "bus {}: kick interval {:?} below the 15 s floor, clamping",
                self.name,
                interval
            );
        }
        self.settings.kick_interval = interval.max(MIN_KICK_INTERVAL);
        self.settings.follow_alarms = follow_alarms;
        self.next_kick = Instant::now() + self.settings.kick_interval;
    }

    /// Resets the bus and updates the sticky alarm flag.
    pub fn reset(&mut self) -> OneWireResult<ResetOutcome> {
        match self.run(Request::Reset)? {
            Completion::ResetDone(outcome) => Ok(outcome),
            _ => Err(OneWireError::ProtocolFraming("reset completion")),
        }
    }

    /// Full enumeration. Returns the fresh present snapshot; the
    /// adopt/retire policy for the diff lives with the host.
    pub fn discover(&mut self) -> OneWireResult<Vec<RomId>> {
        match self.run(Request::Discover)? {
            Completion::Discovered { present, .. } => Ok(present),
            _ => Err(OneWireError::ProtocolFraming("discover completion")),
        }
    }

    /// Alarm scan. Returns the alarmed set.
    pub fn alarms(&mut self) -> OneWireResult<Vec<RomId>> {
        match self.run(Request::Alarms)? {
            Completion::Alarmed(alarmed) => Ok(alarmed),
            _ => Err(OneWireError::ProtocolFraming("alarms completion")),
        }
    }

    /// Seeded single-round presence check.
    pub fn verify(&mut self, rom: RomId) -> OneWireResult<bool> {
        match self.run(Request::Verify(rom))? {
            Completion::Verified(_, present) => Ok(present),
            _ => Err(OneWireError::ProtocolFraming("verify completion")),
        }
    }

    /// Builds and dispatches a transaction: optional target, write
    /// payload, read length. Returns the bytes read.
    pub fn complex(
        &mut self,
        target: Option<RomId>,
        write: &[u8],
        read_len: usize,
    ) -> OneWireResult<Vec<u8>> {
        self.execute(
            Transaction::new(target)
                .with_write(write.to_vec())
                .with_read(read_len),
        )
        .map(|done| done.data)
    }

    /// Dispatches a fully specified transaction.
    pub fn execute(
        &mut self,
        txn: Transaction,
    ) -> OneWireResult<crate::executor::ExecutedTransaction> {
        match self.run(Request::Execute(txn))? {
            Completion::Executed(done) => Ok(done),
            _ => Err(OneWireError::ProtocolFraming("execute completion")),
        }
    }

    /// Broadcasts the temperature-conversion kick. Failures are logged
    /// at informational level and never propagate.
    pub fn kick(&mut self) {
        match self.run(Request::Kick) {
            Ok(_) => log::info!("bus {}: conversion kick sent", self.name),
            Err(e) => log::info!("bus {}: kick skipped: {e}", self.name),
        }
    }

    /// Runs whatever is due: the periodic kick, and the alarm scan a
    /// sticky alarm flag schedules under the follow-alarms policy.
    /// Returns the alarmed set when such a scan ran.
    pub fn tick(&mut self) -> Option<Vec<RomId>> {
        if self.settings.kick_enabled && Instant::now() >= self.next_kick {
            self.next_kick = Instant::now() + self.settings.kick_interval;
            self.kick();
        }
        if self.settings.follow_alarms && self.alarmed {
            match self.alarms() {
                Ok(alarmed) => return Some(alarmed),
                Err(e) => log::warn!("bus {}: follow-up alarm scan failed: {e}", self.name),
            }
        }
        None
    }

    /// Dispatches queued async completions onto `events`. No-op on the
    /// synchronous driver.
    pub fn poll(&mut self, events: &mut dyn BusEvents) -> usize {
        let mut delivered = 0;
        while let Some(completion) = self.inbox.pop_front() {
            dispatch(&completion, events);
            delivered += 1;
        }
        // Drain the channel through the sticky-flag bookkeeping.
        loop {
            let Driver::Async(executor) = &mut self.driver else {
                break;
            };
            let Some(completion) = executor.wait(Duration::ZERO) else {
                break;
            };
            self.note(&completion);
            dispatch(&completion, events);
            delivered += 1;
        }
        delivered
    }

    /// One-line diagnostic naming the bus, the operation and the error
    /// kind.
    pub fn diagnostic(&self, operation: &str, error: &OneWireError) -> String {
        format!("bus {}: {operation}: {}", self.name, error.kind())
    }

    /// Folds a completion into the sticky flag and the roster cache.
    fn note(&mut self, completion: &Completion) {
        match completion {
            Completion::ResetDone(outcome) => {
                if outcome.alarming {
                    self.alarmed = true;
                } else if !outcome.presence && !outcome.short_circuit {
                    self.alarmed = false;
                }
            }
            Completion::Discovered { present, .. } => {
                self.present = present.clone();
            }
            _ => {}
        }
    }

    fn run(&mut self, request: Request) -> OneWireResult<Completion> {
        let operation = request.operation();
        match &mut self.driver {
            Driver::Sync(executor) => {
                let completion = executor.run(request);
                self.note(&completion);
                match completion {
                    Completion::Failed { error, .. } => Err(error),
                    done => Ok(done),
                }
            }
            Driver::Async(_) => self.run_async(request, operation),
        }
    }

    fn async_executor(&mut self) -> &mut AsyncExecutor {
        match &mut self.driver {
            Driver::Async(executor) => executor,
            Driver::Sync(_) => unreachable!("async path on a sync driver"),
        }
    }

    fn run_async(
        &mut self,
        request: Request,
        operation: &'static str,
    ) -> OneWireResult<Completion> {
        self.async_executor().submit(request)?;
        let deadline = Instant::now() + COMPLETION_BUDGET;
        loop {
            match self.async_executor().wait(WAIT_SLICE) {
                Some(completion) => {
                    self.note(&completion);
                    match completion {
                        Completion::Failed {
                            operation: failed_op,
                            error,
                        } if failed_op == operation => return Err(error),
                        Completion::Cancelled => return Err(OneWireError::Cancelled),
                        done if completion_answers(operation, &done) => return Ok(done),
                        other => self.inbox.push_back(other),
                    }
                }
                None => {
                    if Instant::now() >= deadline {
                        return Err(OneWireError::Timeout);
                    }
                }
            }
        }
    }
}

impl<M: OneWireMaster + Send + 'static> BusController<M> {
    /// A controller around a worker thread that owns the master. The
    /// fit for the firmware master, whose wire work is deferred anyway,
    /// and an option for buses running long conversions.
    pub fn new_async(name: impl Into<String>, master: M, settings: BusSettings) -> Self {
        Self::with_driver(
            name.into(),
            Driver::Async(AsyncExecutor::spawn(master)),
            settings,
        )
    }
}

impl<M: OneWireMaster> BusController<M> {
    /// A cloneable submission handle, for clients that consume results
    /// through [`poll`](BusController::poll) callbacks instead of
    /// blocking façade calls. `None` on the synchronous driver.
    pub fn submit_handle(&self) -> Option<SubmitHandle> {
        match &self.driver {
            Driver::Async(executor) => Some(executor.handle()),
            Driver::Sync(_) => None,
        }
    }
}

fn completion_answers(operation: &str, completion: &Completion) -> bool {
    matches!(
        (operation, completion),
        ("execute", Completion::Executed(_))
            | ("discover", Completion::Discovered { .. })
            | ("alarms", Completion::Alarmed(_))
            | ("verify", Completion::Verified(..))
            | ("reset", Completion::ResetDone(_))
            | ("kick", Completion::Kicked)
    )
}
