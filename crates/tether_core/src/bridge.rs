//! Value bridge: host values to boundary values and back
//!
//! Conversions are explicit and checked in both directions. Narrowing never
//! truncates: an engine number that does not fit the requested host type is a
//! `BridgeError::Range`, and an engine value with no defined conversion into
//! the requested kind is a `BridgeError::TypeMismatch`.

use crate::error::BridgeError;
use crate::value::{BoundaryValue, HostElement, HostKind, HostValue};

/// Largest magnitude an `f64` can hold while still being inside `i64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0; // 2^63

/// Convert a host value into its engine-visible form.
pub fn to_engine_value(value: HostValue) -> Result<BoundaryValue, BridgeError> {
    Ok(match value {
        HostValue::Unit => BoundaryValue::Null,
        HostValue::Bool(b) => BoundaryValue::Bool(b),
        HostValue::Char(c) => BoundaryValue::String(c.to_string()),
        HostValue::I32(i) => BoundaryValue::Int(i64::from(i)),
        HostValue::U32(u) => BoundaryValue::Int(i64::from(u)),
        HostValue::I64(i) => BoundaryValue::Int(i),
        HostValue::U64(u) => {
            BoundaryValue::Int(i64::try_from(u).map_err(|_| BridgeError::range(u, HostKind::I64))?)
        }
        HostValue::F32(f) => BoundaryValue::Double(f64::from(f)),
        HostValue::F64(f) => BoundaryValue::Double(f),
        HostValue::String(s) => BoundaryValue::String(s),
        HostValue::Object(object) => BoundaryValue::ObjectRef(object),
        HostValue::Array(array) => BoundaryValue::ArrayRef(array),
        HostValue::Opaque(type_name) => {
            return Err(BridgeError::UnsupportedType {
                type_name: type_name.to_string(),
            })
        }
    })
}

/// Convert an engine value into the host kind the caller expects.
pub fn from_engine_value(
    value: &BoundaryValue,
    expected: HostKind,
) -> Result<HostValue, BridgeError> {
    let mismatch = || BridgeError::mismatch(expected, value.kind_name());

    match (expected, value) {
        (HostKind::Unit, BoundaryValue::Null) => Ok(HostValue::Unit),
        (HostKind::Bool, BoundaryValue::Bool(b)) => Ok(HostValue::Bool(*b)),

        (HostKind::Char, BoundaryValue::String(s)) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(HostValue::Char(c)),
                _ => Err(mismatch()),
            }
        }

        (kind, BoundaryValue::Int(i)) if kind.is_integer() => narrow_integer(*i, kind),
        (kind, BoundaryValue::Double(d)) if kind.is_integer() => {
            if !d.is_finite() || d.fract() != 0.0 {
                return Err(mismatch());
            }
            if *d < -I64_BOUND || *d >= I64_BOUND {
                return Err(BridgeError::range(d, kind));
            }
            narrow_integer(*d as i64, kind)
        }

        (HostKind::F64, BoundaryValue::Int(i)) => Ok(HostValue::F64(*i as f64)),
        (HostKind::F64, BoundaryValue::Double(d)) => Ok(HostValue::F64(*d)),
        (HostKind::F32, BoundaryValue::Int(i)) => Ok(HostValue::F32(*i as f32)),
        (HostKind::F32, BoundaryValue::Double(d)) => {
            if d.is_finite() && d.abs() > f64::from(f32::MAX) {
                return Err(BridgeError::range(d, HostKind::F32));
            }
            Ok(HostValue::F32(*d as f32))
        }

        (HostKind::String, BoundaryValue::String(s)) => Ok(HostValue::String(s.clone())),
        (HostKind::Object, BoundaryValue::ObjectRef(object)) => Ok(HostValue::Object(object.clone())),
        (HostKind::Array, BoundaryValue::ArrayRef(array)) => Ok(HostValue::Array(array.clone())),

        _ => Err(mismatch()),
    }
}

fn narrow_integer(value: i64, target: HostKind) -> Result<HostValue, BridgeError> {
    let out_of_range = |_| BridgeError::range(value, target);
    Ok(match target {
        HostKind::I32 => HostValue::I32(i32::try_from(value).map_err(out_of_range)?),
        HostKind::U32 => HostValue::U32(u32::try_from(value).map_err(out_of_range)?),
        HostKind::I64 => HostValue::I64(value),
        HostKind::U64 => HostValue::U64(u64::try_from(value).map_err(out_of_range)?),
        other => return Err(BridgeError::mismatch(other, "int")),
    })
}

/// Typed shorthand for [`to_engine_value`].
pub fn to_engine<T: HostElement>(value: T) -> Result<BoundaryValue, BridgeError> {
    to_engine_value(value.into_host())
}

/// Typed shorthand for [`from_engine_value`].
pub fn from_engine<T: HostElement>(value: &BoundaryValue) -> Result<T, BridgeError> {
    let host = from_engine_value(value, T::KIND)?;
    T::from_host(host).ok_or_else(|| BridgeError::mismatch(T::KIND, value.kind_name()))
}
