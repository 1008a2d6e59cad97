/*!
 * Isolation
 * Executors that run native calls away from the caller
 *
 * The thread executor protects the caller's thread from blocking; the
 * process executor protects the host from crashes, runaway memory and
 * unwanted capabilities.
 */

pub mod cache;
pub mod process;
pub mod thread;
pub mod types;

pub use cache::BinderCache;
pub use process::{run_helper, ProcessChannel};
pub use thread::ThreadChannel;
pub use types::{CallFuture, ChannelState, IsolationError, IsolationErrorKind, PendingCall, PendingCalls};
