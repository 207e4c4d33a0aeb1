use std::fmt;
use thiserror::Error;

/// Errors returned to code that schedules work onto the engine thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatch bridge has been shut down")]
    Closed,

    #[error("dispatched work was dropped before it completed")]
    Cancelled,

    #[error("no execution context is installed on this thread")]
    NoContext,
}

/// Why a dispatched action failed.
#[derive(Debug)]
pub enum FailureCause {
    /// The action returned an error.
    Error(anyhow::Error),
    /// The action panicked; the payload message is preserved.
    Panic(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Error(err) => write!(f, "{err:#}"),
            FailureCause::Panic(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// A failed action, as delivered to the bridge's error reporter.
#[derive(Debug)]
pub struct ActionFailure {
    /// Enqueue sequence number of the failed action.
    pub sequence: u64,
    pub cause: FailureCause,
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action #{} {}", self.sequence, self.cause)
    }
}

impl std::error::Error for ActionFailure {}
