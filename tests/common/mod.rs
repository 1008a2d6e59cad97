/*!
 * Shared test helpers
 */

#![allow(dead_code)]

use relaxnative::{BindingDescriptor, FunctionBinding, RuntimeConfig};
use std::time::Duration;

/// Path of the compiled C fixture, when a C compiler was available at build time
pub fn fixture_lib() -> Option<&'static str> {
    option_env!("RELAXNATIVE_FIXTURE_LIB")
}

/// Config pointing at the helper binary built with these tests
pub fn helper_config() -> RuntimeConfig {
    RuntimeConfig::default()
        .with_helper_path(env!("CARGO_BIN_EXE_relaxnative-helper"))
        .with_ping_timeout(Duration::from_secs(10))
}

/// Descriptor covering every function in the fixture library
pub fn fixture_descriptor() -> BindingDescriptor {
    BindingDescriptor::new()
        .with_function(FunctionBinding::new("add", "int32", ["int32", "int32"]))
        .with_function(FunctionBinding::new("neg_i8", "int8", ["int8"]))
        .with_function(FunctionBinding::new("mul_i64", "int64", ["int64", "int64"]))
        .with_function(FunctionBinding::new("halve_f32", "float", ["float"]))
        .with_function(FunctionBinding::new(
            "dot",
            "float64",
            ["pointer<float64>", "pointer<float64>", "int32"],
        ))
        .with_function(FunctionBinding::new("scale_in_place", "void", ["pointer<float64>", "int32", "float64"]))
        .with_function(FunctionBinding::new("fill_u8", "void", ["buffer", "int32", "uint8"]))
        .with_function(FunctionBinding::new("sum_u8", "uint32", ["pointer<uint8>", "int32"]))
        .with_function(FunctionBinding::new("first_of_first", "int32", ["pointer<pointer<int32>>"]))
        .with_function(FunctionBinding::new("row_address", "int64", ["pointer<pointer<uint8>>", "int32"]))
        .with_function(FunctionBinding::new("greet", "cstring", Vec::<String>::new()))
        .with_function(FunctionBinding::new("str_len", "int32", ["cstring"]))
        .with_function(FunctionBinding::new("returns_null", "pointer<unknown>", Vec::<String>::new()))
        .with_function(FunctionBinding::new("identity_ptr", "buffer", ["buffer"]))
        .with_function(FunctionBinding::new("sleep_ms", "void", ["int32"]))
        .with_function(FunctionBinding::new("crash_segv", "void", Vec::<String>::new()))
}
