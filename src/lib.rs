/*!
 * relaxnative
 * Bind native libraries from a descriptor and call them directly, on a
 * worker thread, or inside a supervised helper process
 */

pub mod core;
pub mod dispatch;
pub mod ffi;
pub mod isolation;
pub mod memory;
pub mod monitoring;
pub mod security;

// Re-exports
pub use crate::core::{ErrorPayload, RemoteError, RuntimeConfig, RuntimeError, RuntimeResult, ScalarType, Value};
pub use dispatch::{Dispatcher, Invocation, Isolation, ModuleFunction, NativeModule};
pub use ffi::{BindingDescriptor, CallCost, CallMode, FunctionBinding, LibraryBinder, NativeFunction, RawCallables};
pub use isolation::{ChannelState, IsolationError, IsolationErrorKind};
pub use memory::{alloc, alloc_with, free, AllocOptions, NativeBuffer, NativePointer, Ownership, TypedArray};
pub use monitoring::init_tracing;
pub use security::{Limits, Permissions, SafetyMetadata, TrustLevel};

/// Wrap already-bound callables using the process-wide dispatcher
pub fn wrap(
    descriptor: BindingDescriptor,
    library_path: impl Into<String>,
    raw: RawCallables,
    isolation: Isolation,
) -> NativeModule {
    Dispatcher::global().wrap(descriptor, library_path, raw, isolation)
}

/// Bind and wrap a library using the process-wide dispatcher
pub fn load(
    library_path: impl Into<String>,
    descriptor: BindingDescriptor,
    isolation: Isolation,
) -> RuntimeResult<NativeModule> {
    Dispatcher::global().load(library_path, descriptor, isolation)
}
