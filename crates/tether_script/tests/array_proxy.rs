//! Host arrays seen from script through `Host.toJsArray`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tether_core::{BoundaryValue, HostArray, HostElement};
use tether_script::{EngineConfig, EngineInstance, ScriptError};

struct Fixture<T: HostElement> {
    engine: EngineInstance,
    array: HostArray<T>,
    seen: Rc<RefCell<Vec<BoundaryValue>>>,
    fetches: Rc<Cell<usize>>,
}

/// Engine exposing `Host.getArray()` and a recording `Host.test(value)`.
fn fixture<T: HostElement>(items: Vec<T>) -> Fixture<T> {
    let engine = EngineInstance::new(EngineConfig::default(), Vec::<String>::new()).unwrap();
    let array = HostArray::new(items);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let fetches = Rc::new(Cell::new(0));

    let handle = array.handle();
    let count = Rc::clone(&fetches);
    engine
        .register_function("getArray", move |_| {
            count.set(count.get() + 1);
            Ok(BoundaryValue::from(handle.clone()))
        })
        .unwrap();

    let sink = Rc::clone(&seen);
    engine
        .register_function("test", move |args| {
            sink.borrow_mut()
                .push(args.first().cloned().unwrap_or(BoundaryValue::Null));
            Ok(BoundaryValue::Null)
        })
        .unwrap();

    Fixture {
        engine,
        array,
        seen,
        fetches,
    }
}

fn ints(values: &[i64]) -> Vec<BoundaryValue> {
    values.iter().copied().map(BoundaryValue::Int).collect()
}

#[test]
fn can_get_length() {
    let f = fixture(vec![3i32, 4, 6]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             Host.test(array.length);",
        )
        .unwrap();

    assert_eq!(f.fetches.get(), 1);
    assert_eq!(*f.seen.borrow(), ints(&[3]));
}

#[test]
fn can_get_indexed() {
    let f = fixture(vec![3i32, 4, 6]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             Host.test(array[1]);",
        )
        .unwrap();

    assert_eq!(*f.seen.borrow(), ints(&[4]));
}

#[test]
fn can_set_indexed() {
    let f = fixture(vec![3i32, 4, 7]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             array[2] = 234;",
        )
        .unwrap();

    assert_eq!(f.fetches.get(), 1);
    assert_eq!(f.array.to_vec(), vec![3, 4, 234]);
}

#[test]
fn can_for_each() {
    let f = fixture(vec![3i32, 4, 7]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             array.forEach(function (value) { Host.test(value); });",
        )
        .unwrap();

    assert_eq!(*f.seen.borrow(), ints(&[3, 4, 7]));
}

#[test]
fn can_not_push() {
    let f = fixture(vec![3i32, 4, 7]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             try { array.push(23); } catch (err) { Host.test(err instanceof TypeError); }
             Host.test(array.length);",
        )
        .unwrap();

    assert_eq!(
        *f.seen.borrow(),
        vec![BoundaryValue::Bool(true), BoundaryValue::Int(3)]
    );
    assert_eq!(f.array.to_vec(), vec![3, 4, 7]);
}

#[test]
fn every_structural_mutation_throws_type_error() {
    let f = fixture(vec![1i32, 2, 3]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             var attempts = [
                 function () { array.pop(); },
                 function () { array.shift(); },
                 function () { array.unshift(0); },
                 function () { array.splice(0, 1); },
                 function () { array.length = 0; },
                 function () { delete array[0]; },
                 function () { array.extra = 1; },
                 function () { Object.defineProperty(array, '5', { value: 1 }); },
             ];
             var rejected = 0;
             attempts.forEach(function (attempt) {
                 try { attempt(); } catch (err) { if (err instanceof TypeError) rejected++; }
             });
             Host.test(rejected);
             Host.test(array.length);",
        )
        .unwrap();

    assert_eq!(*f.seen.borrow(), ints(&[8, 3]));
    assert_eq!(f.array.to_vec(), vec![1, 2, 3]);
}

#[test]
fn read_at_length_is_undefined_but_write_throws_range_error() {
    let f = fixture(vec![3i32, 4, 7]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             Host.test(array[3] === undefined);
             try { array[3] = 1; } catch (err) { Host.test(err.name); }",
        )
        .unwrap();

    assert_eq!(
        *f.seen.borrow(),
        vec![BoundaryValue::Bool(true), BoundaryValue::from("RangeError")]
    );
    assert_eq!(f.array.len(), 3);
}

#[test]
fn writes_to_integer_keys_past_the_index_range_throw_range_error() {
    let f = fixture(vec![3i32, 4, 7]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             function attempt(key) {
                 try { array[key] = 1; return 'ok'; } catch (err) { return err.name; }
             }
             Host.test(attempt('4294967295'));
             Host.test(attempt('100000000000000000000'));
             Host.test(attempt('-1'));
             Host.test(array[4294967295] === undefined);",
        )
        .unwrap();

    assert_eq!(
        *f.seen.borrow(),
        vec![
            BoundaryValue::from("RangeError"),
            BoundaryValue::from("RangeError"),
            BoundaryValue::from("TypeError"),
            BoundaryValue::Bool(true),
        ]
    );
    assert_eq!(f.array.to_vec(), vec![3, 4, 7]);
}

#[test]
fn writes_are_converted_and_checked() {
    let f = fixture(vec![0i32, 0, 0]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             array[0] = 4.0;
             function failure(value) {
                 try { array[1] = value; return 'ok'; } catch (err) { return err.name; }
             }
             Host.test(failure('5'));
             Host.test(failure(2.5));
             Host.test(failure(Math.pow(2, 40)));
             Host.test(failure({}));",
        )
        .unwrap();

    assert_eq!(
        *f.seen.borrow(),
        vec![
            BoundaryValue::from("TypeError"),
            BoundaryValue::from("TypeError"),
            BoundaryValue::from("RangeError"),
            BoundaryValue::from("TypeError"),
        ]
    );
    assert_eq!(f.array.to_vec(), vec![4, 0, 0]);
}

#[test]
fn same_host_array_yields_same_proxy() {
    let f = fixture(vec![1i32]);
    f.engine
        .execute(
            "Host.test(Host.toJsArray(Host.getArray()) === Host.toJsArray(Host.getArray()));
             Host.test(Host.toJsArray(null) === null);
             Host.test(Host.toJsArray(undefined) === undefined);",
        )
        .unwrap();

    assert_eq!(*f.seen.borrow(), vec![BoundaryValue::Bool(true); 3]);
    assert_eq!(f.fetches.get(), 2);
}

#[test]
fn handles_are_released_when_script_drops_them() {
    let f = fixture(vec![1i32, 2]);
    f.engine
        .execute("var array = Host.toJsArray(Host.getArray()); array[0];")
        .unwrap();
    f.engine.collect_garbage();
    assert_eq!(f.engine.live_handles(), 1);

    f.engine.execute("array = null;").unwrap();
    f.engine.collect_garbage();
    assert_eq!(f.engine.live_handles(), 0);

    f.engine
        .execute("Host.test(Host.toJsArray(Host.getArray())[1]);")
        .unwrap();
    assert_eq!(*f.seen.borrow(), ints(&[2]));
}

#[test]
fn short_lived_host_arrays_do_not_accumulate() {
    let engine = EngineInstance::new(EngineConfig::default(), Vec::<String>::new()).unwrap();
    engine
        .register_function("fresh", |args| {
            let seed = args.first().and_then(BoundaryValue::as_int).unwrap_or(0);
            let array = HostArray::new(vec![seed as i32]);
            Ok(BoundaryValue::from(array.handle()))
        })
        .unwrap();

    // Each host array is dropped on return, so every read sees a disposed handle.
    engine
        .execute(
            "var disposed = 0;
             for (var i = 0; i < 200; i++) {
                 var tmp = Host.fresh(i);
                 try { Host.toJsArray(tmp)[0]; } catch (err) { disposed++; }
                 tmp = null;
             }",
        )
        .unwrap();
    engine.collect_garbage();

    assert_eq!(engine.global("disposed").unwrap(), BoundaryValue::Int(200));
    assert_eq!(engine.live_handles(), 0);
}

#[test]
fn proxy_passed_back_is_the_original_reference() {
    let f = fixture(vec![1i32, 2]);
    f.engine
        .execute("Host.test(Host.toJsArray(Host.getArray()));")
        .unwrap();

    let seen = f.seen.borrow();
    let returned = seen[0].as_array().expect("array reference");
    assert!(returned.ptr_eq(&f.array.handle()));
}

#[test]
fn length_stays_fixed_when_host_grows_the_array() {
    let f = fixture(vec![1i32, 2]);
    f.engine
        .execute("var array = Host.toJsArray(Host.getArray());")
        .unwrap();
    f.array.write().push(3);

    assert_eq!(f.engine.eval("array.length").unwrap(), BoundaryValue::Int(2));
    assert_eq!(f.engine.eval("array[2]").unwrap(), BoundaryValue::Null);
}

#[test]
fn iteration_and_generic_array_methods() {
    let f = fixture(vec![3i32, 4, 7]);
    f.engine
        .execute("var array = Host.toJsArray(Host.getArray());")
        .unwrap();

    assert_eq!(
        f.engine.eval("[...array].join(',')").unwrap(),
        BoundaryValue::from("3,4,7")
    );
    assert_eq!(
        f.engine
            .eval("Array.prototype.map.call(array, function (x) { return x * 2; }).join(',')")
            .unwrap(),
        BoundaryValue::from("6,8,14")
    );
    assert_eq!(
        f.engine.eval("Object.keys(array).join(',')").unwrap(),
        BoundaryValue::from("0,1,2")
    );
}

#[test]
fn for_each_passes_index_and_sees_earlier_writes() {
    let f = fixture(vec![3i32, 4, 7]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             array.forEach(function (value, index, self) {
                 if (index === 0) self[2] = 70;
                 Host.test(value * 100 + index);
             });",
        )
        .unwrap();

    assert_eq!(*f.seen.borrow(), ints(&[300, 401, 7002]));
}

#[test]
fn disposed_array_throws_reference_error() {
    let f = fixture(vec![1i32]);
    f.engine
        .execute("var array = Host.toJsArray(Host.getArray());")
        .unwrap();
    drop(f.array);

    assert_eq!(
        f.engine
            .eval("try { array[0]; 'alive'; } catch (err) { err.name; }")
            .unwrap(),
        BoundaryValue::from("ReferenceError")
    );
}

#[test]
fn uncaught_bridge_error_reaches_the_host() {
    let f = fixture(vec![1i32]);
    let err = f
        .engine
        .execute("Host.toJsArray(Host.getArray()).push(2);")
        .unwrap_err();

    match err {
        ScriptError::Exception { name, message, .. } => {
            assert_eq!(name, "TypeError");
            assert!(message.contains("push"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn other_element_types_convert() {
    let f = fixture(vec![String::from("a"), String::from("b")]);
    f.engine
        .execute(
            "var array = Host.toJsArray(Host.getArray());
             array[1] = array[0] + 'z';",
        )
        .unwrap();
    assert_eq!(f.array.to_vec(), vec!["a".to_string(), "az".to_string()]);

    let f = fixture(vec![0.5f64]);
    f.engine
        .execute("Host.toJsArray(Host.getArray())[0] = 3;")
        .unwrap();
    assert_eq!(f.array.to_vec(), vec![3.0]);
}

#[test]
fn handles_display_as_host_references() {
    let f = fixture(vec![1i32, 2]);
    assert_eq!(
        f.engine.eval("String(Host.getArray())").unwrap(),
        BoundaryValue::from("[array i32; 2]")
    );
    assert_eq!(
        f.engine.eval("Host.getArray().kind").unwrap(),
        BoundaryValue::from("array")
    );
}
