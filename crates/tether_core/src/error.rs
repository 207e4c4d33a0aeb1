use crate::value::HostKind;
use thiserror::Error;

/// Errors raised while moving values across the host/script boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("host type '{type_name}' has no engine representation")]
    UnsupportedType { type_name: String },

    #[error("cannot convert engine {found} into host {expected}")]
    TypeMismatch { expected: HostKind, found: String },

    #[error("engine value {value} is out of range for host {target}")]
    Range { value: String, target: HostKind },

    #[error("index {index} is out of range for fixed length {length}")]
    IndexOutOfRange { index: usize, length: usize },

    #[error("'{operation}' is not supported on a fixed-size array proxy")]
    NotSupported { operation: String },

    #[error("host {what} was disposed while still referenced")]
    Disposed { what: String },
}

impl BridgeError {
    pub(crate) fn mismatch(expected: HostKind, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.into(),
        }
    }

    pub(crate) fn range(value: impl ToString, target: HostKind) -> Self {
        Self::Range {
            value: value.to_string(),
            target,
        }
    }
}
