//! Script-visible host surface
//!
//! Installs the native accessors the array proxy glue calls into, evaluates
//! the glue, and builds the host global (`Host` by default):
//!
//! ```js
//! const numbers = Host.toJsArray(hostNumbers);
//! numbers[1];            // indexed read
//! numbers[2] = 234;      // write-through
//! numbers.forEach(print);
//! numbers.push(1);       // TypeError
//! ```

use crate::config::EngineConfig;
use crate::marshal::{from_js, throw, throw_bridge, to_js, HandleTable, GLUE_KEY};
use rquickjs::function::Rest;
use rquickjs::{Array, Ctx, Exception, Function, Object, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tether_core::{BoundaryValue, BridgeError};

const GLUE_SOURCE: &str = include_str!("glue.js");

pub(crate) fn install<'js>(
    ctx: &Ctx<'js>,
    handles: &Rc<RefCell<HandleTable>>,
    config: &EngineConfig,
    args: &[String],
) -> rquickjs::Result<()> {
    let native = native_accessors(ctx, handles)?;
    let factory: Function<'js> = ctx.eval(GLUE_SOURCE)?;
    let glue: Object<'js> = factory.call((native,))?;

    let globals = ctx.globals();
    globals.set(GLUE_KEY, glue.clone())?;

    let host = Object::new(ctx.clone())?;
    host.set("toJsArray", glue.get::<_, Function<'js>>("toJsArray")?)?;

    let arguments = Array::new(ctx.clone())?;
    arguments.set(0, config.process_name.as_str())?;
    for (index, arg) in args.iter().enumerate() {
        arguments.set(index + 1, arg.as_str())?;
    }
    host.set("arguments", arguments)?;

    globals.set(config.host_global.as_str(), host)?;
    Ok(())
}

fn native_accessors<'js>(
    ctx: &Ctx<'js>,
    handles: &Rc<RefCell<HandleTable>>,
) -> rquickjs::Result<Object<'js>> {
    let native = Object::new(ctx.clone())?;

    let table = Rc::clone(handles);
    native.set(
        "open",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, id: u32| -> rquickjs::Result<u32> {
                let length = table
                    .borrow_mut()
                    .open_proxy(id)
                    .map_err(|err| throw_bridge(&ctx, &err))?;
                u32::try_from(length)
                    .map_err(|_| Exception::throw_range(&ctx, "host array too long for script"))
            },
        )?,
    )?;

    let table = Rc::clone(handles);
    native.set(
        "get",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, id: u32, index: u32| -> rquickjs::Result<Value<'js>> {
                let proxy = table.borrow().proxy(id).map_err(|err| throw_bridge(&ctx, &err))?;
                match proxy
                    .get(index as usize)
                    .map_err(|err| throw_bridge(&ctx, &err))?
                {
                    Some(value) => to_js(&ctx, &table, &value),
                    None => Ok(Value::new_undefined(ctx.clone())),
                }
            },
        )?,
    )?;

    let table = Rc::clone(handles);
    native.set(
        "set",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, id: u32, index: f64, value: Value<'js>| -> rquickjs::Result<()> {
                let proxy = table.borrow().proxy(id).map_err(|err| throw_bridge(&ctx, &err))?;
                let value = from_js(&table, &value).map_err(|err| throw(&ctx, err))?;
                // Keys past the script index range saturate, and still land out of range.
                proxy
                    .set(index as usize, &value)
                    .map_err(|err| throw_bridge(&ctx, &err))
            },
        )?,
    )?;

    let table = Rc::clone(handles);
    native.set(
        "reject",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, id: u32, operation: String| -> rquickjs::Result<()> {
                let proxy = table.borrow().proxy(id).map_err(|err| throw_bridge(&ctx, &err))?;
                proxy
                    .reject::<()>(&operation)
                    .map_err(|err| throw_bridge(&ctx, &err))
            },
        )?,
    )?;

    let table = Rc::clone(handles);
    native.set(
        "release",
        Function::new(ctx.clone(), move |id: u32| {
            table.borrow_mut().release(id);
        })?,
    )?;

    let table = Rc::clone(handles);
    native.set(
        "display",
        Function::new(ctx.clone(), move |id: u32| -> String {
            table.borrow().display(id)
        })?,
    )?;

    Ok(native)
}

/// Expose a host function on the host global.
///
/// Arguments arrive as boundary values; a `BridgeError` becomes the matching
/// script exception.
pub(crate) fn define_host_function<'js, F>(
    ctx: &Ctx<'js>,
    handles: &Rc<RefCell<HandleTable>>,
    host_global: &str,
    name: &str,
    function: F,
) -> rquickjs::Result<()>
where
    F: Fn(&[BoundaryValue]) -> Result<BoundaryValue, BridgeError> + 'static,
{
    let table = Rc::clone(handles);
    let callable = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let args = args
                .0
                .iter()
                .map(|arg| from_js(&table, arg))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| throw(&ctx, err))?;
            let result = function(&args).map_err(|err| throw_bridge(&ctx, &err))?;
            to_js(&ctx, &table, &result)
        },
    )?
    .with_name(name)?;

    let host: Object<'js> = ctx.globals().get(host_global)?;
    host.set(name, callable)
}
