/*!
 * FFI Traits
 * Callable and binder abstractions shared by every isolation mode
 */

use super::descriptor::BindingDescriptor;
use crate::core::errors::RuntimeResult;
use crate::core::types::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A synchronously callable native function
pub trait NativeFunction: Send + Sync {
    fn call(&self, args: &[Value]) -> RuntimeResult<Value>;
}

impl<F> NativeFunction for F
where
    F: Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> RuntimeResult<Value> {
        self(args)
    }
}

impl std::fmt::Debug for dyn NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NativeFunction")
    }
}

/// Raw callables by exported name
pub type RawCallables = BTreeMap<String, Arc<dyn NativeFunction>>;

/// Turns {library path, descriptor} into raw callables
pub trait LibraryBinder: Send + Sync {
    fn bind(&self, library_path: &str, descriptor: &BindingDescriptor) -> RuntimeResult<RawCallables>;
}
