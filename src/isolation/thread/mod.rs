/*!
 * Thread Isolation
 * One lazily started worker thread shared by every thread-isolated module
 */

mod channel;
mod protocol;
mod worker;

pub use channel::ThreadChannel;
pub use protocol::{ThreadRequest, ThreadResponse};

pub(crate) use worker::panic_message;

use crate::isolation::types::ChannelState;
use protocol::WorkerMessage;
use std::thread::JoinHandle;

/// Lifecycle state of the current worker
pub(crate) struct WorkerSlot {
    pub state: ChannelState,
    pub sender: Option<flume::Sender<WorkerMessage>>,
    pub handle: Option<JoinHandle<()>>,
    pub generation: u64,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            state: ChannelState::Absent,
            sender: None,
            handle: None,
            generation: 0,
        }
    }
}
