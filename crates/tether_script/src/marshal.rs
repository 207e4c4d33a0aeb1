//! Boundary values to QuickJS values and back
//!
//! Host references never become plain script objects. They are registered in
//! a per-engine handle table and cross as frozen handle objects that carry the
//! table id; passing a handle (or the array proxy built from it) back to the
//! host resolves to the original reference.

use crate::error::ScriptError;
use rquickjs::{Ctx, Exception, Function, Object, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use tether_core::{ArrayProxy, ArrayRef, BoundaryValue, BridgeError, HostKind, ObjectRef};

/// Property carrying the handle id on handle objects and array proxies.
pub(crate) const HANDLE_KEY: &str = "__tether_handle";
/// Global holding the script half of the bridge.
pub(crate) const GLUE_KEY: &str = "__tether_glue";

#[derive(Clone)]
enum HandleTarget {
    Array(ArrayRef),
    Object(ObjectRef),
}

impl HandleTarget {
    fn kind(&self) -> &'static str {
        match self {
            HandleTarget::Array(_) => "array",
            HandleTarget::Object(_) => "object",
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            HandleTarget::Array(array) => array.element_type(),
            HandleTarget::Object(object) => object.type_name(),
        }
    }

    fn identity(&self) -> (bool, usize) {
        match self {
            HandleTarget::Array(array) => (true, array.id()),
            HandleTarget::Object(object) => (false, object.id()),
        }
    }

    fn to_value(&self) -> BoundaryValue {
        match self {
            HandleTarget::Array(array) => BoundaryValue::ArrayRef(array.clone()),
            HandleTarget::Object(object) => BoundaryValue::ObjectRef(object.clone()),
        }
    }
}

struct HandleEntry {
    target: HandleTarget,
    proxy: Option<ArrayProxy>,
}

/// Host references currently visible to script.
///
/// An entry is released when the script side finalizes the last handle object
/// or proxy for its id. Entries left at engine teardown are cleared there.
#[derive(Default)]
pub(crate) struct HandleTable {
    entries: HashMap<u32, HandleEntry>,
    ids: HashMap<(bool, usize), u32>,
    next_id: u32,
}

impl HandleTable {
    fn register(&mut self, target: HandleTarget) -> u32 {
        if let Some(&id) = self.ids.get(&target.identity()) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(target.identity(), id);
        self.entries.insert(id, HandleEntry { target, proxy: None });
        id
    }

    pub(crate) fn resolve(&self, id: u32) -> Result<BoundaryValue, BridgeError> {
        self.entries
            .get(&id)
            .map(|entry| entry.target.to_value())
            .ok_or_else(|| unknown_handle(id))
    }

    /// Open (or reuse) the proxy for an array handle and return its length.
    pub(crate) fn open_proxy(&mut self, id: u32) -> Result<usize, BridgeError> {
        let entry = self.entries.get_mut(&id).ok_or_else(|| unknown_handle(id))?;
        if let Some(proxy) = &entry.proxy {
            return Ok(proxy.length());
        }
        let proxy = match &entry.target {
            HandleTarget::Array(array) => ArrayProxy::new(array.clone())?,
            HandleTarget::Object(_) => {
                return Err(BridgeError::TypeMismatch {
                    expected: HostKind::Array,
                    found: "object".to_string(),
                })
            }
        };
        let length = proxy.length();
        entry.proxy = Some(proxy);
        Ok(length)
    }

    pub(crate) fn proxy(&self, id: u32) -> Result<ArrayProxy, BridgeError> {
        self.entries
            .get(&id)
            .and_then(|entry| entry.proxy.clone())
            .ok_or_else(|| unknown_handle(id))
    }

    /// Forget `id`. The host reference is registered afresh if it crosses again.
    pub(crate) fn release(&mut self, id: u32) {
        match self.entries.remove(&id) {
            Some(entry) => {
                self.ids.remove(&entry.target.identity());
                tracing::trace!(id, kind = entry.target.kind(), "handle released");
            }
            None => tracing::trace!(id, "release of unknown handle"),
        }
    }

    pub(crate) fn display(&self, id: u32) -> String {
        match self.entries.get(&id) {
            Some(entry) => entry.target.to_value().to_string(),
            None => format!("[unknown handle #{id}]"),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }
}

fn unknown_handle(id: u32) -> BridgeError {
    BridgeError::Disposed {
        what: format!("handle #{id}"),
    }
}

pub(crate) fn to_js<'js>(
    ctx: &Ctx<'js>,
    handles: &RefCell<HandleTable>,
    value: &BoundaryValue,
) -> rquickjs::Result<Value<'js>> {
    Ok(match value {
        BoundaryValue::Null => Value::new_null(ctx.clone()),
        BoundaryValue::Bool(b) => Value::new_bool(ctx.clone(), *b),
        BoundaryValue::Int(i) => match i32::try_from(*i) {
            Ok(small) => Value::new_int(ctx.clone(), small),
            Err(_) => Value::new_float(ctx.clone(), *i as f64),
        },
        BoundaryValue::Double(d) => Value::new_float(ctx.clone(), *d),
        BoundaryValue::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        BoundaryValue::ArrayRef(array) => {
            wrap_handle(ctx, handles, HandleTarget::Array(array.clone()))?
        }
        BoundaryValue::ObjectRef(object) => {
            wrap_handle(ctx, handles, HandleTarget::Object(object.clone()))?
        }
    })
}

fn wrap_handle<'js>(
    ctx: &Ctx<'js>,
    handles: &RefCell<HandleTable>,
    target: HandleTarget,
) -> rquickjs::Result<Value<'js>> {
    let kind = target.kind();
    let type_name = target.type_name();
    let id = handles.borrow_mut().register(target);

    let glue: Object<'js> = ctx.globals().get(GLUE_KEY)?;
    let make: Function<'js> = glue.get("handle")?;
    make.call((id, kind, type_name))
}

pub(crate) fn from_js<'js>(
    handles: &RefCell<HandleTable>,
    value: &Value<'js>,
) -> Result<BoundaryValue, ScriptError> {
    if value.is_undefined() || value.is_null() {
        return Ok(BoundaryValue::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(BoundaryValue::Bool(b));
    }
    if let Some(i) = value.as_int() {
        return Ok(BoundaryValue::Int(i64::from(i)));
    }
    if let Some(f) = value.as_float() {
        return Ok(BoundaryValue::Double(f));
    }
    if let Some(s) = value.as_string() {
        return Ok(BoundaryValue::String(s.to_string()?));
    }
    if let Some(object) = value.as_object() {
        if let Some(id) = object.get::<_, Option<u32>>(HANDLE_KEY)? {
            return Ok(handles.borrow().resolve(id)?);
        }
        let type_name = if value.is_function() {
            "script function"
        } else if value.is_array() {
            "script array"
        } else {
            "script object"
        };
        return Err(BridgeError::UnsupportedType {
            type_name: type_name.to_string(),
        }
        .into());
    }
    let type_name = if value.is_symbol() {
        "script symbol"
    } else {
        "script value"
    };
    Err(BridgeError::UnsupportedType {
        type_name: type_name.to_string(),
    }
    .into())
}

/// Raise a bridge error as the matching script exception.
pub(crate) fn throw_bridge(ctx: &Ctx<'_>, error: &BridgeError) -> rquickjs::Error {
    let message = error.to_string();
    match error {
        BridgeError::IndexOutOfRange { .. } | BridgeError::Range { .. } => {
            Exception::throw_range(ctx, &message)
        }
        BridgeError::Disposed { .. } => Exception::throw_reference(ctx, &message),
        BridgeError::UnsupportedType { .. }
        | BridgeError::TypeMismatch { .. }
        | BridgeError::NotSupported { .. } => Exception::throw_type(ctx, &message),
    }
}

/// Raise any script error inside a native callback.
pub(crate) fn throw(ctx: &Ctx<'_>, error: ScriptError) -> rquickjs::Error {
    match error {
        ScriptError::Engine(err) => err,
        ScriptError::Bridge(err) => throw_bridge(ctx, &err),
        other => Exception::throw_message(ctx, &other.to_string()),
    }
}

/// Turn a failed engine call into a host error, collecting the pending
/// exception when there is one.
pub(crate) fn capture(ctx: &Ctx<'_>, error: rquickjs::Error) -> ScriptError {
    if !matches!(error, rquickjs::Error::Exception) {
        return ScriptError::Engine(error);
    }
    let caught = ctx.catch();
    let Some(object) = caught.as_object() else {
        return ScriptError::Exception {
            name: "Error".to_string(),
            message: primitive_text(&caught),
            stack: None,
        };
    };
    let text = |key: &str| object.get::<_, Option<String>>(key).ok().flatten();
    ScriptError::Exception {
        name: text("name").unwrap_or_else(|| "Error".to_string()),
        message: text("message").unwrap_or_default(),
        stack: text("stack").filter(|stack| !stack.is_empty()),
    }
}

fn primitive_text(value: &Value<'_>) -> String {
    if let Some(s) = value.as_string() {
        s.to_string().unwrap_or_default()
    } else if let Some(i) = value.as_int() {
        i.to_string()
    } else if let Some(f) = value.as_float() {
        BoundaryValue::Double(f).to_string()
    } else if let Some(b) = value.as_bool() {
        b.to_string()
    } else if value.is_null() {
        "null".to_string()
    } else {
        "undefined".to_string()
    }
}
