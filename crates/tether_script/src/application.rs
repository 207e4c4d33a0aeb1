//! Application: an engine instance wired to a dispatch bridge
//!
//! ```ignore
//! let app = Application::new(EngineConfig::default(), std::env::args().skip(1))?;
//! let handle = app.handle();
//!
//! std::thread::spawn(move || {
//!     handle.dispatch(|| tracing::info!("on the engine thread")).ok();
//!     handle.quit();
//! });
//!
//! let code = app.exec()?;
//! ```

use crate::config::EngineConfig;
use crate::engine::{EngineHandle, EngineInstance};
use crate::error::ScriptError;
use std::future::Future;
use std::sync::Arc;
use tether_dispatch::{ContextGuard, DispatchBridge, DispatchError, TaskHandle};

/// Owns the engine, its dispatch bridge, and the ambient context installation.
///
/// Create it on the thread that will run `exec`.
pub struct Application {
    engine: EngineInstance,
    bridge: Arc<DispatchBridge>,
    _context: ContextGuard,
}

impl Application {
    pub fn new<I, S>(config: EngineConfig, args: I) -> Result<Self, ScriptError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::from_engine(EngineInstance::new(config, args)?))
    }

    /// Wrap an engine created elsewhere on this thread.
    ///
    /// Replaces the engine's wake callback.
    pub fn from_engine(engine: EngineInstance) -> Self {
        let bridge = Arc::new(DispatchBridge::new(engine.handle()));

        let drain = Arc::clone(&bridge);
        engine.register_wake_callback(move || {
            drain.drain();
        });
        let context = tether_dispatch::install(bridge.clone());

        tracing::debug!(id = %engine.id(), "application started");
        Self {
            engine,
            bridge,
            _context: context,
        }
    }

    pub fn engine(&self) -> &EngineInstance {
        &self.engine
    }

    pub fn bridge(&self) -> &Arc<DispatchBridge> {
        &self.bridge
    }

    /// Cross-thread handle for scheduling work and requesting exit.
    pub fn handle(&self) -> AppHandle {
        AppHandle {
            engine: self.engine.handle(),
            bridge: Arc::clone(&self.bridge),
        }
    }

    pub fn dispatch<F>(&self, action: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.bridge.enqueue(action).map(|_| ())
    }

    /// Dispatch an action whose `Err` goes to the bridge's error reporter.
    pub fn try_dispatch<F>(&self, action: F) -> Result<(), DispatchError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.bridge.enqueue_fallible(action).map(|_| ())
    }

    pub fn invoke<F, R>(&self, work: F) -> Result<TaskHandle<R>, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        tether_dispatch::invoke(self.bridge.as_ref(), work)
    }

    /// Drive `future` on the engine thread; every resumption goes through the
    /// dispatch queue.
    pub fn spawn<F>(&self, future: F) -> Result<TaskHandle<F::Output>, DispatchError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tether_dispatch::spawn(self.bridge.clone(), future)
    }

    pub fn exec(&self) -> Result<i32, ScriptError> {
        self.engine.exec()
    }

    pub fn exit(&self, code: i32) {
        self.engine.handle().exit(code);
    }

    pub fn quit(&self) {
        self.exit(0);
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        let discarded = self.bridge.shutdown();
        tracing::debug!(id = %self.engine.id(), discarded, "application shut down");
    }
}

/// `Send + Sync` handle to a running [`Application`].
#[derive(Clone)]
pub struct AppHandle {
    engine: EngineHandle,
    bridge: Arc<DispatchBridge>,
}

impl AppHandle {
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn dispatch<F>(&self, action: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.bridge.enqueue(action).map(|_| ())
    }

    pub fn try_dispatch<F>(&self, action: F) -> Result<(), DispatchError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.bridge.enqueue_fallible(action).map(|_| ())
    }

    pub fn invoke<F, R>(&self, work: F) -> Result<TaskHandle<R>, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        tether_dispatch::invoke(self.bridge.as_ref(), work)
    }

    pub fn spawn<F>(&self, future: F) -> Result<TaskHandle<F::Output>, DispatchError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tether_dispatch::spawn(self.bridge.clone(), future)
    }

    pub fn exit(&self, code: i32) {
        self.engine.exit(code);
    }

    pub fn quit(&self) {
        self.exit(0);
    }
}
