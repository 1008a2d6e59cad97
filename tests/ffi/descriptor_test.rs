/*!
 * Descriptor Tests
 * Descriptor parsing and bind-time validation
 */

use relaxnative::ffi::{bind_functions, NativeType};
use relaxnative::{BindingDescriptor, CallCost, CallMode, ScalarType};

#[test]
fn test_map_form_with_legacy_keys() {
    let descriptor = BindingDescriptor::from_json(
        r#"{
            "functions": {
                "dot": {"returnType": "double", "argTypes": ["pointer<double>", "pointer<double>", "int"], "cost": "high"},
                "tick": {"name": "tick", "returns": "void", "args": [], "mode": "async"}
            }
        }"#,
    )
    .unwrap();

    assert_eq!(descriptor.names().collect::<Vec<_>>(), vec!["dot", "tick"]);
    let dot = descriptor.get("dot").unwrap();
    assert_eq!(dot.name, "dot");
    assert_eq!(dot.cost, Some(CallCost::High));
    assert_eq!(descriptor.get("tick").unwrap().mode, Some(CallMode::Async));

    let signatures = descriptor.resolve_all().unwrap();
    assert_eq!(signatures["dot"].returns, NativeType::Scalar(ScalarType::F64));
    assert_eq!(signatures["dot"].args[0], NativeType::Pointer(ScalarType::F64));
}

#[test]
fn test_array_form() {
    let descriptor = BindingDescriptor::from_json(
        r#"{"functions": [{"name": "add", "returns": "int", "args": ["int", "int"]}]}"#,
    )
    .unwrap();
    assert!(descriptor.contains("add"));
    assert_eq!(descriptor.get("add").unwrap().to_string(), "int add(int, int)");
}

#[test]
fn test_unknown_type_fails_at_bind_time() {
    let descriptor = BindingDescriptor::from_json(
        r#"{"functions": {"f": {"returns": "int", "args": ["complex128"]}}}"#,
    )
    .unwrap();

    // The library is never opened when a signature is invalid
    let err = bind_functions("/definitely/not/here.so", &descriptor).unwrap_err();
    assert_eq!(err.name(), "BindError");
    assert!(err.to_string().contains("complex128"));
}

#[test]
fn test_missing_library_is_load_error() {
    let descriptor = BindingDescriptor::from_json(
        r#"{"functions": {"f": {"returns": "int", "args": []}}}"#,
    )
    .unwrap();
    let err = bind_functions("/definitely/not/here.so", &descriptor).unwrap_err();
    assert_eq!(err.name(), "LoadError");
}

#[test]
fn test_pointer_tags() {
    assert_eq!(NativeType::parse("pointer"), Some(NativeType::Pointer(ScalarType::I32)));
    assert_eq!(NativeType::parse("pointer<unknown>"), Some(NativeType::OpaquePointer));
    assert_eq!(NativeType::parse("pointer<pointer<float>>"), Some(NativeType::PointerTable));
    assert_eq!(NativeType::parse("const char*"), Some(NativeType::CString));
    assert_eq!(NativeType::parse("uint64_t"), Some(NativeType::Scalar(ScalarType::U64)));
    assert_eq!(NativeType::parse("void"), Some(NativeType::Void));
}
