//! Boundary and host value model
//!
//! `BoundaryValue` is what the script engine sees. `HostValue` is what the
//! host side stores. The two never share ownership of referenced data: object
//! and array variants carry weak handles (see `host.rs`).

use crate::host::{ArrayRef, ObjectRef};
use std::fmt;

/// Tagged value crossing the host/script boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    ObjectRef(ObjectRef),
    ArrayRef(ArrayRef),
}

impl BoundaryValue {
    /// Name of the active variant, used in mismatch diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            BoundaryValue::Null => "null",
            BoundaryValue::Bool(_) => "bool",
            BoundaryValue::Int(_) => "int",
            BoundaryValue::Double(_) => "double",
            BoundaryValue::String(_) => "string",
            BoundaryValue::ObjectRef(_) => "object",
            BoundaryValue::ArrayRef(_) => "array",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, BoundaryValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BoundaryValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            BoundaryValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of `Int` or `Double`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            BoundaryValue::Int(i) => Some(*i as f64),
            BoundaryValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BoundaryValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            BoundaryValue::ArrayRef(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            BoundaryValue::ObjectRef(object) => Some(object),
            _ => None,
        }
    }
}

impl From<bool> for BoundaryValue {
    fn from(value: bool) -> Self {
        BoundaryValue::Bool(value)
    }
}

impl From<i32> for BoundaryValue {
    fn from(value: i32) -> Self {
        BoundaryValue::Int(value as i64)
    }
}

impl From<i64> for BoundaryValue {
    fn from(value: i64) -> Self {
        BoundaryValue::Int(value)
    }
}

impl From<f64> for BoundaryValue {
    fn from(value: f64) -> Self {
        BoundaryValue::Double(value)
    }
}

impl From<&str> for BoundaryValue {
    fn from(value: &str) -> Self {
        BoundaryValue::String(value.to_string())
    }
}

impl From<String> for BoundaryValue {
    fn from(value: String) -> Self {
        BoundaryValue::String(value)
    }
}

impl From<ArrayRef> for BoundaryValue {
    fn from(value: ArrayRef) -> Self {
        BoundaryValue::ArrayRef(value)
    }
}

impl From<ObjectRef> for BoundaryValue {
    fn from(value: ObjectRef) -> Self {
        BoundaryValue::ObjectRef(value)
    }
}

/// Display value, rendered the way script would print it.
impl fmt::Display for BoundaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryValue::Null => f.write_str("null"),
            BoundaryValue::Bool(b) => write!(f, "{b}"),
            BoundaryValue::Int(i) => write!(f, "{i}"),
            BoundaryValue::Double(d) if d.is_nan() => f.write_str("NaN"),
            BoundaryValue::Double(d) if d.is_infinite() => {
                f.write_str(if *d > 0.0 { "Infinity" } else { "-Infinity" })
            }
            BoundaryValue::Double(d) => write!(f, "{d}"),
            BoundaryValue::String(s) => f.write_str(s),
            BoundaryValue::ObjectRef(object) => write!(f, "{object}"),
            BoundaryValue::ArrayRef(array) => write!(f, "{array}"),
        }
    }
}

/// Host-side type a boundary value can be converted into.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HostKind {
    Unit,
    Bool,
    Char,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    Object,
    Array,
}

impl HostKind {
    pub fn name(self) -> &'static str {
        match self {
            HostKind::Unit => "()",
            HostKind::Bool => "bool",
            HostKind::Char => "char",
            HostKind::I32 => "i32",
            HostKind::U32 => "u32",
            HostKind::I64 => "i64",
            HostKind::U64 => "u64",
            HostKind::F32 => "f32",
            HostKind::F64 => "f64",
            HostKind::String => "String",
            HostKind::Object => "object",
            HostKind::Array => "array",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            HostKind::I32 | HostKind::U32 | HostKind::I64 | HostKind::U64
        )
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Host-native value.
///
/// `Opaque` stands for a host value whose type has no engine mapping; it only
/// remembers the type name so the failure can say what was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Unit,
    Bool(bool),
    Char(char),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Object(ObjectRef),
    Array(ArrayRef),
    Opaque(&'static str),
}

impl HostValue {
    /// Placeholder for a host value of type `T`, which the bridge cannot map.
    pub fn opaque<T: ?Sized>() -> Self {
        HostValue::Opaque(std::any::type_name::<T>())
    }

    pub fn kind(&self) -> Option<HostKind> {
        Some(match self {
            HostValue::Unit => HostKind::Unit,
            HostValue::Bool(_) => HostKind::Bool,
            HostValue::Char(_) => HostKind::Char,
            HostValue::I32(_) => HostKind::I32,
            HostValue::U32(_) => HostKind::U32,
            HostValue::I64(_) => HostKind::I64,
            HostValue::U64(_) => HostKind::U64,
            HostValue::F32(_) => HostKind::F32,
            HostValue::F64(_) => HostKind::F64,
            HostValue::String(_) => HostKind::String,
            HostValue::Object(_) => HostKind::Object,
            HostValue::Array(_) => HostKind::Array,
            HostValue::Opaque(_) => return None,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Opaque(name) => name,
            other => other.kind().map(HostKind::name).unwrap_or("<unknown>"),
        }
    }
}

/// Rust types that can live in host storage and cross the boundary.
pub trait HostElement: Clone + Send + Sync + 'static {
    /// Kind requested from the value bridge on write-back.
    const KIND: HostKind;

    fn into_host(self) -> HostValue;

    fn from_host(value: HostValue) -> Option<Self>;
}

macro_rules! define_host_element {
    ($ty:ty, $variant:ident) => {
        impl HostElement for $ty {
            const KIND: HostKind = HostKind::$variant;

            #[inline]
            fn into_host(self) -> HostValue {
                HostValue::$variant(self)
            }

            #[inline]
            fn from_host(value: HostValue) -> Option<Self> {
                match value {
                    HostValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

define_host_element!(bool, Bool);
define_host_element!(char, Char);
define_host_element!(i32, I32);
define_host_element!(u32, U32);
define_host_element!(i64, I64);
define_host_element!(u64, U64);
define_host_element!(f32, F32);
define_host_element!(f64, F64);
define_host_element!(String, String);
define_host_element!(ObjectRef, Object);
define_host_element!(ArrayRef, Array);

impl HostElement for () {
    const KIND: HostKind = HostKind::Unit;

    fn into_host(self) -> HostValue {
        HostValue::Unit
    }

    fn from_host(value: HostValue) -> Option<Self> {
        matches!(value, HostValue::Unit).then_some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_script_rendering() {
        assert_eq!(BoundaryValue::Null.to_string(), "null");
        assert_eq!(BoundaryValue::Int(-4).to_string(), "-4");
        assert_eq!(BoundaryValue::Double(2.5).to_string(), "2.5");
        assert_eq!(BoundaryValue::Double(f64::NAN).to_string(), "NaN");
        assert_eq!(BoundaryValue::Double(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(BoundaryValue::from("hi").to_string(), "hi");
    }

    #[test]
    fn opaque_remembers_type_name() {
        let value = HostValue::opaque::<std::time::Instant>();
        assert_eq!(value.kind(), None);
        assert_eq!(value.type_name(), "std::time::Instant");
    }

    #[test]
    fn host_element_round_trips_through_host_value() {
        assert_eq!(i32::from_host(7i32.into_host()), Some(7));
        assert_eq!(i32::from_host(HostValue::I64(7)), None);
        assert_eq!(<()>::from_host(HostValue::Unit), Some(()));
        assert_eq!(String::KIND, HostKind::String);
    }
}
