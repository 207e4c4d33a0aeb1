//! Script engine instance and its event loop
//!
//! An `EngineInstance` is bound to the thread that created it. That thread is
//! the engine thread: it runs `exec`, every script, and the wake callback.
//! Other threads talk to it through an [`EngineHandle`].

use crate::bindings;
use crate::config::EngineConfig;
use crate::error::ScriptError;
use crate::marshal::{capture, from_js, to_js, HandleTable};
use rquickjs::function::Rest;
use rquickjs::{Context, Ctx, Object, Runtime, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::Path;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tether_core::{BoundaryValue, BridgeError};
use tether_dispatch::WakeSignal;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Process-unique engine instance id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

impl EngineId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

#[derive(Debug)]
enum EngineEvent {
    Wake,
    Exit(i32),
}

/// Thread-safe handle to an engine instance.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    id: EngineId,
    sender: UnboundedSender<EngineEvent>,
}

impl EngineHandle {
    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Ask the engine thread to run its wake callback.
    pub fn request_wake(&self) {
        if self.sender.send(EngineEvent::Wake).is_err() {
            tracing::trace!(id = %self.id, "wake dropped, engine destroyed");
        }
    }

    /// Make the running (or next) `exec` return `code`.
    pub fn exit(&self, code: i32) {
        if self.sender.send(EngineEvent::Exit(code)).is_err() {
            tracing::trace!(id = %self.id, code, "exit dropped, engine destroyed");
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl WakeSignal for EngineHandle {
    fn request_wake(&self) {
        EngineHandle::request_wake(self);
    }
}

type WakeCallback = Box<dyn FnMut()>;

struct EngineInner {
    id: EngineId,
    config: EngineConfig,
    args: Vec<String>,
    handles: Rc<RefCell<HandleTable>>,
    sender: UnboundedSender<EngineEvent>,
    events: RefCell<UnboundedReceiver<EngineEvent>>,
    wake_callback: RefCell<Option<WakeCallback>>,
    running: Cell<bool>,
    exit_code: Cell<Option<i32>>,
    // The context must drop before the runtime.
    context: Context,
    runtime: Runtime,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let released = self.handles.borrow().len();
        self.handles.borrow_mut().clear();
        tracing::debug!(id = %self.id, released, "engine instance destroyed");
    }
}

thread_local! {
    static CURRENT_ENGINE: RefCell<Option<Weak<EngineInner>>> = const { RefCell::new(None) };
}

/// Run `f` against the engine whose event loop is running on this thread.
///
/// Returns `None` outside of `exec`/`process_events`.
pub fn with_current_engine<R>(f: impl FnOnce(&EngineInstance) -> R) -> Option<R> {
    let inner = CURRENT_ENGINE.with(|slot| slot.borrow().as_ref().and_then(Weak::upgrade))?;
    Some(f(&EngineInstance { inner }))
}

struct EnterGuard {
    previous: Option<Weak<EngineInner>>,
}

impl EnterGuard {
    fn enter(inner: &Rc<EngineInner>) -> Self {
        let previous = CURRENT_ENGINE.with(|slot| slot.replace(Some(Rc::downgrade(inner))));
        Self { previous }
    }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = CURRENT_ENGINE.try_with(|slot| *slot.borrow_mut() = previous);
    }
}

struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A QuickJS engine plus its event loop.
pub struct EngineInstance {
    inner: Rc<EngineInner>,
}

impl EngineInstance {
    /// Create an engine on the calling thread.
    ///
    /// `args` are exposed to script after the process name, as
    /// `Host.arguments`.
    pub fn new<I, S>(config: EngineConfig, args: I) -> Result<Self, ScriptError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let runtime = Runtime::new()?;
        if let Some(limit) = config.limits.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = config.limits.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        if let Some(threshold) = config.limits.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        let context = Context::full(&runtime)?;

        let handles = Rc::new(RefCell::new(HandleTable::default()));
        context.with(|ctx| {
            bindings::install(&ctx, &handles, &config, &args).map_err(|err| capture(&ctx, err))
        })?;

        let (sender, receiver) = unbounded_channel();
        let id = EngineId::next();
        tracing::debug!(%id, host_global = %config.host_global, args = args.len(), "engine instance created");

        Ok(Self {
            inner: Rc::new(EngineInner {
                id,
                config,
                args,
                handles,
                sender,
                events: RefCell::new(receiver),
                wake_callback: RefCell::new(None),
                running: Cell::new(false),
                exit_code: Cell::new(None),
                context,
                runtime,
            }),
        })
    }

    pub fn id(&self) -> EngineId {
        self.inner.id
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            id: self.inner.id,
            sender: self.inner.sender.clone(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Arguments as passed to [`EngineInstance::new`], without the process name.
    pub fn args(&self) -> &[String] {
        &self.inner.args
    }

    /// Register the callback run on the engine thread for each wake request.
    /// Replaces any previous callback.
    pub fn register_wake_callback(&self, callback: impl FnMut() + 'static) {
        *self.inner.wake_callback.borrow_mut() = Some(Box::new(callback));
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Run the event loop until an exit is requested; returns the exit code.
    ///
    /// Blocks the calling thread between events. Must not be called from
    /// inside an async runtime.
    pub fn exec(&self) -> Result<i32, ScriptError> {
        let inner = &self.inner;
        if inner.running.replace(true) {
            return Err(ScriptError::AlreadyRunning);
        }
        let _running = RunningGuard(&inner.running);
        let _current = EnterGuard::enter(inner);
        tracing::debug!(id = %inner.id, "event loop started");

        loop {
            self.run_pending_jobs();
            if let Some(code) = inner.exit_code.take() {
                tracing::debug!(id = %inner.id, code, "event loop exited");
                return Ok(code);
            }
            let event = inner.events.borrow_mut().blocking_recv();
            match event {
                Some(event) => self.handle_event(event),
                None => return Ok(0),
            }
        }
    }

    /// Service events that have already arrived, without blocking.
    ///
    /// Returns the number of events handled. An exit request is remembered
    /// for the next `exec`.
    pub fn process_events(&self) -> usize {
        let _current = EnterGuard::enter(&self.inner);
        let mut handled = 0;
        loop {
            let event = self.inner.events.borrow_mut().try_recv();
            match event {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                }
                Err(_) => break,
            }
        }
        self.run_pending_jobs();
        handled
    }

    fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Wake => self.fire_wake(),
            EngineEvent::Exit(code) => self.inner.exit_code.set(Some(code)),
        }
    }

    fn fire_wake(&self) {
        let callback = self.inner.wake_callback.borrow_mut().take();
        match callback {
            Some(mut callback) => {
                callback();
                let mut slot = self.inner.wake_callback.borrow_mut();
                if slot.is_none() {
                    *slot = Some(callback);
                }
            }
            None => tracing::trace!(id = %self.inner.id, "wake with no callback registered"),
        }
    }

    /// Run queued promise jobs. Returns how many ran.
    pub fn run_pending_jobs(&self) -> usize {
        let mut ran = 0;
        while self.inner.runtime.is_job_pending() {
            match self.inner.runtime.execute_pending_job() {
                Ok(true) => ran += 1,
                Ok(false) => break,
                Err(failed) => {
                    ran += 1;
                    let error = failed
                        .0
                        .with(|ctx| capture(&ctx, rquickjs::Error::Exception));
                    tracing::warn!(id = %self.inner.id, %error, "uncaught exception in pending job");
                }
            }
        }
        ran
    }

    /// Run a full QuickJS collection, then the finalizer jobs it queued.
    ///
    /// Host references script no longer reaches are released here.
    pub fn collect_garbage(&self) {
        self.inner.runtime.run_gc();
        let jobs = self.run_pending_jobs();
        tracing::trace!(id = %self.inner.id, jobs, live = self.live_handles(), "garbage collected");
    }

    /// Evaluate `source` and return its completion value.
    pub fn eval(&self, source: &str) -> Result<BoundaryValue, ScriptError> {
        let inner = &self.inner;
        let result = inner.context.with(|ctx| match ctx.eval::<Value, _>(source) {
            Ok(value) => from_js(&inner.handles, &value),
            Err(err) => Err(capture(&ctx, err)),
        });
        self.run_pending_jobs();
        result
    }

    /// Evaluate `source` for its side effects.
    pub fn execute(&self, source: &str) -> Result<(), ScriptError> {
        let inner = &self.inner;
        let result = inner.context.with(|ctx| {
            ctx.eval::<(), _>(source)
                .map_err(|err| capture(&ctx, err))
        });
        self.run_pending_jobs();
        result
    }

    pub fn execute_file(&self, path: impl AsRef<Path>) -> Result<(), ScriptError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "executing script file");
        self.execute(&source)
    }

    /// Call the global function `name`.
    pub fn call_function(
        &self,
        name: &str,
        args: &[BoundaryValue],
    ) -> Result<BoundaryValue, ScriptError> {
        let inner = &self.inner;
        let result = inner.context.with(|ctx| {
            let target: Value = ctx.globals().get(name).map_err(|err| capture(&ctx, err))?;
            let Some(function) = target.as_function() else {
                return Err(ScriptError::NotCallable(name.to_string()));
            };
            let args = args
                .iter()
                .map(|arg| to_js(&ctx, &inner.handles, arg))
                .collect::<rquickjs::Result<Vec<_>>>()?;
            let value: Value = function
                .call((Rest(args),))
                .map_err(|err| capture(&ctx, err))?;
            from_js(&inner.handles, &value)
        });
        self.run_pending_jobs();
        result
    }

    /// Bind a boundary value to a script global.
    pub fn set_global(&self, name: &str, value: &BoundaryValue) -> Result<(), ScriptError> {
        let inner = &self.inner;
        inner.context.with(|ctx| {
            let value = to_js(&ctx, &inner.handles, value)?;
            ctx.globals().set(name, value)?;
            Ok(())
        })
    }

    /// Bind a boundary value as `<host global>.<name>`.
    pub fn expose(&self, name: &str, value: &BoundaryValue) -> Result<(), ScriptError> {
        let inner = &self.inner;
        inner.context.with(|ctx| {
            let value = to_js(&ctx, &inner.handles, value)?;
            let host: Object = ctx.globals().get(inner.config.host_global.as_str())?;
            host.set(name, value)?;
            Ok(())
        })
    }

    /// Read a script global as a boundary value.
    pub fn global(&self, name: &str) -> Result<BoundaryValue, ScriptError> {
        let inner = &self.inner;
        inner.context.with(|ctx| {
            let value: Value = ctx.globals().get(name)?;
            from_js(&inner.handles, &value)
        })
    }

    /// Expose `function` to script as `<host global>.<name>`.
    pub fn register_function<F>(&self, name: &str, function: F) -> Result<(), ScriptError>
    where
        F: Fn(&[BoundaryValue]) -> Result<BoundaryValue, BridgeError> + 'static,
    {
        let inner = &self.inner;
        inner.context.with(|ctx| {
            bindings::define_host_function(
                &ctx,
                &inner.handles,
                &inner.config.host_global,
                name,
                function,
            )
        })?;
        tracing::trace!(id = %inner.id, name, "host function registered");
        Ok(())
    }

    /// Direct access to the QuickJS context.
    pub fn with_context<R>(&self, f: impl FnOnce(Ctx<'_>) -> R) -> R {
        self.inner.context.with(f)
    }

    /// Number of host references script holds that are not yet released.
    pub fn live_handles(&self) -> usize {
        self.inner.handles.borrow().len()
    }
}

impl fmt::Debug for EngineInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineInstance")
            .field("id", &self.inner.id)
            .field("running", &self.inner.running.get())
            .field("live_handles", &self.live_handles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EngineInstance {
        EngineInstance::new(EngineConfig::default(), ["--demo"]).unwrap()
    }

    #[test]
    fn eval_returns_boundary_values() {
        let engine = engine();
        assert_eq!(engine.eval("1 + 2").unwrap(), BoundaryValue::Int(3));
        assert_eq!(engine.eval("0.5").unwrap(), BoundaryValue::Double(0.5));
        assert_eq!(engine.eval("'a' + 'b'").unwrap(), BoundaryValue::from("ab"));
        assert_eq!(engine.eval("undefined").unwrap(), BoundaryValue::Null);
    }

    #[test]
    fn arguments_start_with_process_name() {
        let engine = engine();
        assert_eq!(
            engine.eval("Host.arguments.join(' ')").unwrap(),
            BoundaryValue::from("tether --demo")
        );
    }

    #[test]
    fn uncaught_exception_keeps_name_and_message() {
        let engine = engine();
        let err = engine.execute("throw new RangeError('too far')").unwrap_err();
        match err {
            ScriptError::Exception { name, message, .. } => {
                assert_eq!(name, "RangeError");
                assert_eq!(message, "too far");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn calling_a_non_function_is_reported() {
        let engine = engine();
        engine.execute("var answer = 42;").unwrap();
        assert!(matches!(
            engine.call_function("answer", &[]),
            Err(ScriptError::NotCallable(_))
        ));
        engine.execute("function twice(x) { return x * 2; }").unwrap();
        assert_eq!(
            engine.call_function("twice", &[BoundaryValue::Int(21)]).unwrap(),
            BoundaryValue::Int(42)
        );
    }

    #[test]
    fn exit_before_exec_returns_immediately() {
        let engine = engine();
        engine.handle().exit(3);
        assert_eq!(engine.exec().unwrap(), 3);
        assert!(!engine.is_running());
    }

    #[test]
    fn wake_runs_the_callback_inside_exec() {
        let engine = engine();
        let handle = engine.handle();
        let woken = Rc::new(Cell::new(0));

        let count = Rc::clone(&woken);
        engine.register_wake_callback(move || {
            count.set(count.get() + 1);
            handle.exit(7);
        });

        engine.handle().request_wake();
        assert_eq!(engine.exec().unwrap(), 7);
        assert_eq!(woken.get(), 1);
    }

    #[test]
    fn nested_exec_is_rejected() {
        let engine = engine();
        let handle = engine.handle();
        let nested = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&nested);
        engine.register_wake_callback(move || {
            let result = with_current_engine(|engine| engine.exec().map(|_| ()));
            *slot.borrow_mut() = result.map(|r| r.map_err(|e| e.to_string()));
            handle.exit(0);
        });
        engine.handle().request_wake();
        engine.exec().unwrap();

        assert_eq!(
            *nested.borrow(),
            Some(Err(ScriptError::AlreadyRunning.to_string()))
        );
    }

    #[test]
    fn promise_jobs_run_after_eval() {
        let engine = engine();
        engine
            .execute("var settled = 0; Promise.resolve(5).then(v => { settled = v; });")
            .unwrap();
        assert_eq!(engine.global("settled").unwrap(), BoundaryValue::Int(5));
    }

    #[test]
    fn exposed_values_live_on_the_host_global() {
        let engine = engine();
        engine.expose("answer", &BoundaryValue::Int(42)).unwrap();
        assert_eq!(engine.eval("Host.answer").unwrap(), BoundaryValue::Int(42));

        engine.set_global("greeting", &BoundaryValue::from("hi")).unwrap();
        assert_eq!(engine.global("greeting").unwrap(), BoundaryValue::from("hi"));
    }

    #[test]
    fn throwing_job_does_not_stop_the_engine() {
        let engine = engine();
        engine
            .execute(
                "var registry = new FinalizationRegistry(() => { throw new TypeError('cleanup failed'); });
                 registry.register({}, 0);",
            )
            .unwrap();
        engine.collect_garbage();

        engine
            .execute("var after = 0; Promise.resolve(1).then(v => { after = v; });")
            .unwrap();
        assert_eq!(engine.global("after").unwrap(), BoundaryValue::Int(1));
    }

    #[test]
    fn no_current_engine_outside_the_loop() {
        assert!(with_current_engine(|_| ()).is_none());
    }

    #[test]
    fn process_events_handles_delivered_wakes() {
        let engine = engine();
        let woken = Rc::new(Cell::new(0));
        let count = Rc::clone(&woken);
        engine.register_wake_callback(move || count.set(count.get() + 1));

        engine.handle().request_wake();
        engine.handle().request_wake();
        assert_eq!(engine.process_events(), 2);
        assert_eq!(woken.get(), 2);
        assert_eq!(engine.process_events(), 0);
    }
}
