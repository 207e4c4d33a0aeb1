//! Dispatch bridge: cross-thread action queue with coalesced wake signalling
//!
//! Any thread may enqueue. Only the first enqueue after the bridge goes idle
//! asks the engine to wake; the engine thread then drains everything that was
//! queued at that moment. Work enqueued during a drain waits for the next one.
//!
//! ```ignore
//! let bridge = Arc::new(DispatchBridge::new(engine_handle));
//!
//! // Any thread
//! bridge.enqueue(|| tracing::info!("hello from the engine thread"))?;
//!
//! // Engine thread, from the wake callback
//! bridge.drain();
//! ```

use crate::context::{Continuation, ExecutionContext};
use crate::error::{ActionFailure, DispatchError, FailureCause};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Capability to ask the engine thread to call back into the bridge.
pub trait WakeSignal: Send + Sync {
    fn request_wake(&self);
}

impl<F> WakeSignal for F
where
    F: Fn() + Send + Sync,
{
    fn request_wake(&self) {
        self()
    }
}

/// Receives every action failure observed while draining.
pub type ErrorReporter = Arc<dyn Fn(&ActionFailure) + Send + Sync>;

/// Wake state of a bridge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DispatchState {
    /// No wake outstanding.
    Idle,
    /// A wake was sent and has not been serviced yet.
    WakeRequested,
    /// The engine thread is running a captured batch.
    Draining,
}

/// Outcome of one [`DispatchBridge::drain`] call.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub executed: usize,
    pub failed: usize,
}

/// Counter snapshot, see [`DispatchBridge::stats`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    pub enqueued: u64,
    pub executed: u64,
    pub failed: u64,
    pub wakes_requested: u64,
    pub drains: u64,
}

type ActionFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

struct PendingAction {
    sequence: u64,
    run: ActionFn,
}

struct QueueState {
    actions: VecDeque<PendingAction>,
    state: DispatchState,
    closed: bool,
    next_sequence: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    wakes_requested: AtomicU64,
    drains: AtomicU64,
}

/// Thread-safe FIFO of actions destined for the engine thread.
pub struct DispatchBridge {
    queue: Mutex<QueueState>,
    wake: Box<dyn WakeSignal>,
    reporter: RwLock<ErrorReporter>,
    counters: Counters,
}

impl DispatchBridge {
    pub fn new(wake: impl WakeSignal + 'static) -> Self {
        Self {
            queue: Mutex::new(QueueState {
                actions: VecDeque::with_capacity(16),
                state: DispatchState::Idle,
                closed: false,
                next_sequence: 0,
            }),
            wake: Box::new(wake),
            reporter: RwLock::new(Arc::new(log_failure)),
            counters: Counters::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an action for the engine thread. Returns its sequence number.
    pub fn enqueue<F>(&self, action: F) -> Result<u64, DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Box::new(move || {
            action();
            Ok(())
        }))
    }

    /// Queue an action whose `Err` is reported like a panic would be.
    pub fn enqueue_fallible<F>(&self, action: F) -> Result<u64, DispatchError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.push(Box::new(action))
    }

    fn push(&self, run: ActionFn) -> Result<u64, DispatchError> {
        let (sequence, signal) = {
            let mut queue = self.lock();
            if queue.closed {
                return Err(DispatchError::Closed);
            }
            let sequence = queue.next_sequence;
            queue.next_sequence += 1;
            queue.actions.push_back(PendingAction { sequence, run });

            let signal = queue.state == DispatchState::Idle;
            if signal {
                queue.state = DispatchState::WakeRequested;
            }
            (sequence, signal)
        };

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(sequence, signal, "action enqueued");

        if signal {
            self.signal_wake();
        }
        Ok(sequence)
    }

    fn signal_wake(&self) {
        self.counters.wakes_requested.fetch_add(1, Ordering::Relaxed);
        self.wake.request_wake();
    }

    /// Run every action queued at the time of the call, in FIFO order.
    ///
    /// Must be called on the engine thread (normally from the wake callback).
    /// A call made while a drain is already running returns immediately.
    pub fn drain(&self) -> DrainReport {
        let batch = {
            let mut queue = self.lock();
            if queue.closed || queue.state == DispatchState::Draining {
                return DrainReport::default();
            }
            queue.state = DispatchState::Draining;
            std::mem::take(&mut queue.actions)
        };

        self.counters.drains.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(batch = batch.len(), "draining dispatch queue");

        let mut report = DrainReport::default();
        for action in batch {
            report.executed += 1;
            if let Err(failure) = execute(action) {
                report.failed += 1;
                self.report(&failure);
            }
        }
        self.counters
            .executed
            .fetch_add(report.executed as u64, Ordering::Relaxed);
        self.counters
            .failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);

        let resignal = {
            let mut queue = self.lock();
            if queue.closed || queue.actions.is_empty() {
                queue.state = DispatchState::Idle;
                false
            } else {
                queue.state = DispatchState::WakeRequested;
                true
            }
        };
        if resignal {
            self.signal_wake();
        }
        report
    }

    fn report(&self, failure: &ActionFailure) {
        let reporter = Arc::clone(&self.reporter.read().unwrap_or_else(PoisonError::into_inner));
        // A panicking reporter must not abandon the rest of the batch.
        if panic::catch_unwind(AssertUnwindSafe(|| reporter(failure))).is_err() {
            tracing::error!(
                sequence = failure.sequence,
                "error reporter panicked while reporting: {}",
                failure.cause
            );
        }
    }

    /// Replace the error channel for failed actions.
    pub fn set_error_reporter(&self, reporter: impl Fn(&ActionFailure) + Send + Sync + 'static) {
        *self.reporter.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(reporter);
    }

    /// Close the bridge, discarding anything still queued.
    ///
    /// Returns the number of discarded actions. Later enqueues fail with
    /// [`DispatchError::Closed`].
    pub fn shutdown(&self) -> usize {
        let discarded = {
            let mut queue = self.lock();
            queue.closed = true;
            queue.state = DispatchState::Idle;
            std::mem::take(&mut queue.actions)
        };
        if !discarded.is_empty() {
            tracing::warn!(count = discarded.len(), "discarding pending actions on shutdown");
        }
        discarded.len()
    }

    pub fn state(&self) -> DispatchState {
        self.lock().state
    }

    /// Number of actions waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.lock().actions.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            wakes_requested: self.counters.wakes_requested.load(Ordering::Relaxed),
            drains: self.counters.drains.load(Ordering::Relaxed),
        }
    }
}

/// Continuations posted through the bridge resume inside a drain.
impl ExecutionContext for DispatchBridge {
    fn post(&self, continuation: Continuation) -> Result<(), DispatchError> {
        self.enqueue(continuation).map(|_| ())
    }
}

fn execute(action: PendingAction) -> Result<(), ActionFailure> {
    let PendingAction { sequence, run } = action;
    let cause = match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(error)) => FailureCause::Error(error),
        Err(payload) => FailureCause::Panic(panic_message(payload.as_ref())),
    };
    Err(ActionFailure { sequence, cause })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

fn log_failure(failure: &ActionFailure) {
    tracing::error!(sequence = failure.sequence, "dispatched action failed: {}", failure.cause);
}
