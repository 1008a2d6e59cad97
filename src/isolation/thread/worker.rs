/*!
 * Worker Loop
 * Runs forwarded calls on the isolation thread
 */

use super::protocol::{ThreadRequest, ThreadResponse, WorkerMessage};
use super::WorkerSlot;
use crate::core::errors::{ErrorPayload, RuntimeError, RuntimeResult};
use crate::core::types::Value;
use crate::ffi::LibraryBinder;
use crate::isolation::cache::BinderCache;
use crate::isolation::types::{ChannelState, PendingCalls};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub(crate) struct WorkerContext {
    pub generation: u64,
    pub pending: Arc<PendingCalls<ThreadResponse>>,
    pub slot: Arc<Mutex<WorkerSlot>>,
    pub binder: Arc<dyn LibraryBinder>,
    pub cache_capacity: usize,
}

/// Marks the slot dead and rejects this generation's calls when the loop ends
struct WorkerExit {
    receiver: Option<flume::Receiver<WorkerMessage>>,
    generation: u64,
    pending: Arc<PendingCalls<ThreadResponse>>,
    slot: Arc<Mutex<WorkerSlot>>,
    clean: bool,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        // Close the queue first so late senders fail instead of queueing
        drop(self.receiver.take());

        let crashed = !self.clean || std::thread::panicking();
        {
            let mut slot = self.slot.lock();
            if slot.generation == self.generation {
                slot.state = if crashed {
                    ChannelState::Crashed
                } else {
                    ChannelState::Exited
                };
                slot.sender = None;
            }
        }

        let message = if crashed {
            "Worker thread crashed"
        } else {
            "Worker thread exited"
        };
        let rejected = self.pending.reject_generation(self.generation, |id| {
            ThreadResponse::failed(id, ErrorPayload::new("WorkerError", message), None)
        });

        if crashed {
            error!(generation = self.generation, rejected, "worker thread crashed");
        } else {
            info!(generation = self.generation, rejected, "worker thread exited");
        }
    }
}

pub(crate) fn run(receiver: flume::Receiver<WorkerMessage>, context: WorkerContext) {
    let WorkerContext {
        generation,
        pending,
        slot,
        binder,
        cache_capacity,
    } = context;

    let mut exit = WorkerExit {
        receiver: Some(receiver),
        generation,
        pending: Arc::clone(&pending),
        slot,
        clean: false,
    };
    let mut cache = BinderCache::new(binder, cache_capacity);
    debug!(generation, "worker thread started");

    loop {
        let message = match exit.receiver.as_ref().map(|rx| rx.recv()) {
            Some(Ok(message)) => message,
            _ => break,
        };

        match message {
            WorkerMessage::Shutdown => break,
            WorkerMessage::Call(request) => {
                let id = request.id;
                let response = execute(&mut cache, request);
                if !pending.complete(id, generation, response) {
                    warn!(id, "worker response had no waiting caller");
                }
            }
        }
    }

    exit.clean = true;
}

fn execute(cache: &mut BinderCache, request: ThreadRequest) -> ThreadResponse {
    let ThreadRequest {
        id,
        library_path,
        binding_descriptor,
        fn_name,
        args,
        callsite,
    } = request;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> RuntimeResult<Value> {
        match cache.resolve(&library_path, &binding_descriptor, &fn_name)? {
            Some(function) => function.call(&args),
            None => Err(RuntimeError::MissingFunction {
                name: fn_name.clone(),
                exports: binding_descriptor.names().map(String::from).collect(),
            }),
        }
    }));

    match outcome {
        Ok(Ok(result)) => ThreadResponse::Ok { id, result },
        Ok(Err(err)) => ThreadResponse::failed(id, err.to_payload(None), Some(callsite)),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(id, function = %fn_name, %message, "native call panicked on worker");
            ThreadResponse::failed(id, ErrorPayload::new("NativePanicError", message), Some(callsite))
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "native call panicked".to_string()
    }
}
