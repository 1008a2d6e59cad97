/*!
 * Dispatch
 * Routes each call to a direct, worker-thread or helper-process executor
 */

mod dispatcher;
mod module;
pub mod types;

pub use dispatcher::Dispatcher;
pub use module::{ModuleFunction, NativeModule};
pub use types::{Invocation, Isolation};
