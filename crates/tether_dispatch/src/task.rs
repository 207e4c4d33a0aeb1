//! Results and futures that resume on an execution context
//!
//! `invoke` runs a closure on the context and hands back its result.
//! `spawn` drives a future whose every poll, including the one after each
//! wake-up, is posted through the context, so the future only ever runs where
//! the context runs its work.

use crate::context::{self, ExecutionContext};
use crate::error::DispatchError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Wake, Waker};
use tokio::sync::oneshot;

/// Completion handle for work scheduled on an execution context.
///
/// Await it from async code or block on it from a thread that is not the one
/// running the work. Resolves to [`DispatchError::Cancelled`] if the work was
/// dropped (bridge shut down, or the work panicked).
#[must_use = "dropping a TaskHandle discards the result, not the work"]
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block the calling thread until the result arrives.
    ///
    /// Calling this on the thread that runs the work deadlocks.
    pub fn blocking_wait(self) -> Result<T, DispatchError> {
        self.receiver
            .blocking_recv()
            .map_err(|_| DispatchError::Cancelled)
    }

    /// Take the result if it is ready.
    pub fn try_take(&mut self) -> Result<Option<T>, DispatchError> {
        match self.receiver.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(DispatchError::Cancelled),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map_err(|_| DispatchError::Cancelled)
    }
}

/// Run `work` on `context` and return a handle to its result.
pub fn invoke<F, R>(context: &dyn ExecutionContext, work: F) -> Result<TaskHandle<R>, DispatchError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    context.post(Box::new(move || {
        let _ = sender.send(work());
    }))?;
    Ok(TaskHandle { receiver })
}

/// Drive `future` to completion on `context`.
pub fn spawn<F>(
    context: Arc<dyn ExecutionContext>,
    future: F,
) -> Result<TaskHandle<F::Output>, DispatchError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let task = Arc::new(Task {
        future: Mutex::new(Some(Box::pin(async move {
            let _ = sender.send(future.await);
        }))),
        context,
        scheduled: AtomicBool::new(true),
    });
    task.schedule()?;
    Ok(TaskHandle { receiver })
}

/// [`spawn`] onto the calling thread's ambient context.
pub fn spawn_on_current<F>(future: F) -> Result<TaskHandle<F::Output>, DispatchError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let context = context::current().ok_or(DispatchError::NoContext)?;
    spawn(context, future)
}

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Task {
    future: Mutex<Option<BoxedFuture>>,
    context: Arc<dyn ExecutionContext>,
    scheduled: AtomicBool,
}

impl Task {
    fn schedule(self: Arc<Self>) -> Result<(), DispatchError> {
        let context = Arc::clone(&self.context);
        context.post(Box::new(move || self.run()))
    }

    fn run(self: Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);

        let mut slot = self.future.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut future) = slot.take() else {
            return;
        };
        let waker = Waker::from(Arc::clone(&self));
        let mut cx = Context::from_waker(&waker);
        if future.as_mut().poll(&mut cx).is_pending() {
            *slot = Some(future);
        }
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.schedule() {
            tracing::debug!(%err, "task wake-up dropped");
        }
    }
}
