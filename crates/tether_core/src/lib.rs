//! Tether Core
//!
//! Engine-agnostic half of the host/script bridge:
//! - Boundary value model (`BoundaryValue`, `HostValue`, `HostKind`)
//! - Value bridge conversions with checked narrowing
//! - Host-owned containers with weak, disposal-checked handles
//! - Fixed-length array proxy with JS-array read/write semantics
//!
//! Nothing in this crate knows about threads or a particular script engine;
//! see `tether_dispatch` and `tether_script` for those.

pub mod bridge;
pub mod error;
pub mod host;
pub mod proxy;
pub mod value;

pub use bridge::{from_engine, from_engine_value, to_engine, to_engine_value};
pub use error::BridgeError;
pub use host::{ArrayRef, ArrayStorage, HostArray, HostObject, ObjectRef};
pub use proxy::{ArrayProxy, ProxyIter};
pub use value::{BoundaryValue, HostElement, HostKind, HostValue};

/// Bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
