//! Tether Dispatch
//!
//! Moves work from arbitrary threads onto the single thread that owns the
//! script engine.
//!
//! ## Pieces
//!
//! - [`DispatchBridge`]: FIFO action queue with coalesced wake-ups
//! - [`context`]: thread-local ambient [`ExecutionContext`] and its guard
//! - [`task`]: `invoke`/`spawn` plus the [`TaskHandle`] they return

pub mod bridge;
pub mod context;
pub mod error;
pub mod task;

pub use bridge::{
    DispatchBridge, DispatchState, DispatchStats, DrainReport, ErrorReporter, WakeSignal,
};
pub use context::{install, post_to_current, Continuation, ContextGuard, ExecutionContext};
pub use error::{ActionFailure, DispatchError, FailureCause};
pub use task::{invoke, spawn, spawn_on_current, TaskHandle};
