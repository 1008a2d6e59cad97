/*!
 * Process Isolation
 * A supervised helper process running native calls out of the host
 */

mod channel;
mod helper;
mod intrinsics;
pub mod protocol;

pub use channel::ProcessChannel;
pub use helper::run_helper;
pub use protocol::{BoxedView, CallRequest, WireArg, WireRequest, WireResponse, WireValue};

/// Names the helper answers without a native binding
pub fn intrinsic_names() -> impl Iterator<Item = &'static str> {
    intrinsics::names()
}
