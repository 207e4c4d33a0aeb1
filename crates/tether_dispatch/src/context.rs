//! Ambient execution context
//!
//! Continuations of asynchronous work resume through whatever context is
//! installed on the thread that scheduled them. An application installs its
//! dispatch bridge on the engine thread for as long as it is alive; the guard
//! puts back whatever was installed before.

use crate::error::DispatchError;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

/// A unit of work handed to an [`ExecutionContext`].
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere continuations can be posted to run later.
pub trait ExecutionContext: Send + Sync {
    fn post(&self, continuation: Continuation) -> Result<(), DispatchError>;
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn ExecutionContext>>> = const { RefCell::new(None) };
}

/// Install `context` as this thread's ambient context until the guard drops.
pub fn install(context: Arc<dyn ExecutionContext>) -> ContextGuard {
    let previous = CURRENT.with(|slot| slot.replace(Some(context)));
    tracing::trace!(had_previous = previous.is_some(), "execution context installed");
    ContextGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// The context installed on this thread, if any.
pub fn current() -> Option<Arc<dyn ExecutionContext>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Post to the ambient context of the calling thread.
pub fn post_to_current<F>(continuation: F) -> Result<(), DispatchError>
where
    F: FnOnce() + Send + 'static,
{
    current()
        .ok_or(DispatchError::NoContext)?
        .post(Box::new(continuation))
}

/// Restores the previously installed context on drop.
///
/// Bound to the thread it was created on.
#[must_use = "the context is uninstalled when the guard is dropped"]
pub struct ContextGuard {
    previous: Option<Arc<dyn ExecutionContext>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // Thread-local storage may already be gone during thread teardown.
        let _ = CURRENT.try_with(|slot| *slot.borrow_mut() = previous);
    }
}
