//! Tether Scripting Bridge
//!
//! JavaScript execution via QuickJS, with host arrays exposed to script as
//! fixed-length proxies and host work dispatched onto the engine thread.
//!
//! ## Architecture
//!
//! - **Engine:** [`EngineInstance`] owns the QuickJS runtime and event loop;
//!   [`EngineHandle`] wakes or stops it from any thread
//! - **Marshaling:** boundary values from `tether_core` cross as script
//!   primitives or handle objects; `Host.toJsArray(handle)` yields the proxy
//! - **Application:** [`Application`] ties an engine to a
//!   `tether_dispatch::DispatchBridge` and installs it as the ambient
//!   execution context

pub mod application;
mod bindings;
pub mod config;
pub mod engine;
pub mod error;
mod marshal;

pub use application::{AppHandle, Application};
pub use config::{EngineConfig, EngineLimits};
pub use engine::{with_current_engine, EngineHandle, EngineId, EngineInstance};
pub use error::ScriptError;

pub use rquickjs;
