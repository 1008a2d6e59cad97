/*!
 * Native Call Binding
 * Type mapping, descriptors, library loading and argument marshalling
 */

mod binder;
pub mod descriptor;
pub mod library;
mod marshal;
pub mod traits;
pub mod types;

pub use binder::{bind_functions, bind_library, BoundFunction, FfiBinder};
pub use descriptor::{BindingDescriptor, CallCost, CallMode, FunctionBinding, Signature};
pub use library::LibraryLoader;
pub use traits::{LibraryBinder, NativeFunction, RawCallables};
pub use types::{FfiError, FfiResult, NativeType};
