/*!
 * Binding Tests
 * In-process calls against the compiled C fixture
 */

use crate::common::{fixture_descriptor, fixture_lib};
use relaxnative::memory::ViewData;
use relaxnative::{
    alloc, BindingDescriptor, Dispatcher, FunctionBinding, Isolation, NativeModule, Ownership,
    RuntimeConfig, RuntimeResult, TypedArray, Value,
};

fn load(lib: &str) -> NativeModule {
    Dispatcher::new(RuntimeConfig::default())
        .load(lib, fixture_descriptor(), Isolation::InProcess)
        .unwrap()
}

fn call(module: &NativeModule, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
    module.call(name, args).into_ready().unwrap()
}

#[test]
fn test_scalar_calls() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    assert_eq!(call(&module, "add", vec![Value::I32(2), Value::I32(3)]).unwrap(), Value::I32(5));
    assert_eq!(call(&module, "neg_i8", vec![Value::I8(7)]).unwrap(), Value::I8(-7));
    assert_eq!(
        call(&module, "mul_i64", vec![Value::I64(1 << 33), Value::I64(3)]).unwrap(),
        Value::I64(3 << 33)
    );
    assert_eq!(call(&module, "halve_f32", vec![Value::F64(5.0)]).unwrap(), Value::F32(2.5));
}

#[test]
fn test_every_export_is_direct_in_process() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    for name in module.exports() {
        assert!(module.is_direct(&name), "{name} should be bound directly");
    }
    assert!(module.call("add", vec![Value::I32(1), Value::I32(1)]).is_ready());
}

#[test]
fn test_plain_arrays_are_copied_in() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    let result = call(
        &module,
        "dot",
        vec![
            Value::Array(vec![1.0, 2.0, 3.0]),
            Value::Array(vec![4.0, 5.0, 6.0]),
            Value::I32(3),
        ],
    )
    .unwrap();
    assert_eq!(result, Value::F64(32.0));
}

#[test]
fn test_view_mutation_is_visible() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    let view = TypedArray::new(vec![1.0f64, 2.0, 4.0]);
    let result = call(
        &module,
        "scale_in_place",
        vec![Value::View(view.clone()), Value::I32(3), Value::F64(0.5)],
    )
    .unwrap();

    assert_eq!(result, Value::Void);
    assert_eq!(view.to_vec::<f64>().unwrap(), vec![0.5, 1.0, 2.0]);
}

#[test]
fn test_buffer_shared_between_calls() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    let buf = alloc(16).unwrap();
    call(
        &module,
        "fill_u8",
        vec![Value::Buffer(buf.clone()), Value::I32(16), Value::U8(3)],
    )
    .unwrap();
    assert_eq!(buf.to_vec().unwrap(), vec![3u8; 16]);

    let sum = call(&module, "sum_u8", vec![Value::Buffer(buf.clone()), Value::I32(16)]).unwrap();
    assert_eq!(sum, Value::U32(48));
    buf.free().unwrap();
}

#[test]
fn test_pointer_tables() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    let row = alloc(8).unwrap();
    row.write_slice::<i32>(0, &[42, 7]).unwrap();
    let first = call(&module, "first_of_first", vec![Value::Rows(vec![Value::Buffer(row.clone())])]).unwrap();
    assert_eq!(first, Value::I32(42));

    let a = alloc(4).unwrap();
    let b = alloc(4).unwrap();
    let rows = Value::Rows(vec![Value::Buffer(a.clone()), Value::Buffer(b.clone())]);
    let address = call(&module, "row_address", vec![rows, Value::I32(1)]).unwrap();
    assert_eq!(address, Value::I64(b.address().unwrap() as i64));

    let view_rows = Value::Rows(vec![Value::View(TypedArray::new(vec![1i32]))]);
    let err = call(&module, "first_of_first", vec![view_rows]).unwrap_err();
    assert_eq!(err.name(), "TypeError");
}

#[test]
fn test_strings_and_null() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    assert_eq!(call(&module, "greet", vec![]).unwrap(), Value::Str("hello from native".into()));
    assert_eq!(call(&module, "str_len", vec![Value::Str("abcd".into())]).unwrap(), Value::I32(4));
    assert_eq!(call(&module, "str_len", vec![Value::Null]).unwrap(), Value::I32(-1));
    assert_eq!(call(&module, "returns_null", vec![]).unwrap(), Value::Null);
}

#[test]
fn test_returned_pointer_is_borrowed() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    let buf = alloc(32).unwrap();
    let result = call(&module, "identity_ptr", vec![Value::Buffer(buf.clone())]).unwrap();
    let pointer = result.as_pointer().unwrap();
    assert_eq!(pointer.address(), buf.address().unwrap());
    assert_eq!(pointer.ownership(), Ownership::Borrowed);

    // Borrowed memory cannot be released through the runtime
    assert!(pointer.free().is_err());
    buf.free().unwrap();
}

#[test]
fn test_argument_errors() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    let err = call(&module, "add", vec![Value::I32(1)]).unwrap_err();
    assert_eq!(err.name(), "TypeError");
    assert!(err.to_string().contains("expected 2 arguments, got 1"));

    let err = call(&module, "neg_i8", vec![Value::I32(300)]).unwrap_err();
    assert_eq!(err.name(), "RangeError");

    let err = call(&module, "sum_u8", vec![Value::U64(0x1000), Value::I32(1)]).unwrap_err();
    assert_eq!(err.name(), "TypeError");

    let mismatched = TypedArray::from_data(ViewData::zeroed(relaxnative::ScalarType::F32, 2));
    let err = call(
        &module,
        "scale_in_place",
        vec![Value::View(mismatched), Value::I32(2), Value::F64(1.0)],
    )
    .unwrap_err();
    assert_eq!(err.name(), "TypeError");
}

#[test]
fn test_freed_buffer_is_rejected() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    let buf = alloc(4).unwrap();
    buf.free().unwrap();
    let err = call(&module, "sum_u8", vec![Value::Buffer(buf), Value::I32(4)]).unwrap_err();
    assert_eq!(err.name(), "UseAfterFreeError");
}

#[test]
fn test_missing_symbol_is_load_error() {
    let Some(lib) = fixture_lib() else { return };
    let descriptor = BindingDescriptor::new().with_function(FunctionBinding::new(
        "not_in_fixture",
        "int32",
        Vec::<String>::new(),
    ));

    let err = Dispatcher::new(RuntimeConfig::default())
        .load(lib, descriptor, Isolation::InProcess)
        .unwrap_err();
    assert_eq!(err.name(), "LoadError");
    assert!(err.to_string().contains("not_in_fixture"));
}

#[test]
fn test_unknown_export_lists_available() {
    let Some(lib) = fixture_lib() else { return };
    let module = load(lib);

    let err = call(&module, "nope", vec![]).unwrap_err();
    assert_eq!(err.name(), "MissingFunctionError");
    assert!(err.to_string().contains("add"));
}

#[test]
fn test_bound_function_reused_across_threads() {
    let Some(lib) = fixture_lib() else { return };
    let callables = relaxnative::ffi::bind_functions(lib, &fixture_descriptor()).unwrap();
    let add = std::sync::Arc::clone(&callables["add"]);

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let add = std::sync::Arc::clone(&add);
            std::thread::spawn(move || {
                for i in 0..500 {
                    let got = add.call(&[Value::I32(t), Value::I32(i)]).unwrap();
                    assert_eq!(got, Value::I32(t + i));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
}
