/*!
 * Worker Channel
 * Correlates caller futures with worker responses by call id
 */

use super::protocol::{ThreadRequest, ThreadResponse, WorkerMessage};
use super::worker::{self, WorkerContext};
use super::WorkerSlot;
use crate::core::errors::{RuntimeError, RuntimeResult};
use crate::core::types::{CallId, Value};
use crate::ffi::{BindingDescriptor, LibraryBinder};
use crate::isolation::types::{CallFuture, ChannelState, PendingCalls};
use futures::future::{self, FutureExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// Thread-isolated executor
pub struct ThreadChannel {
    binder: Arc<dyn LibraryBinder>,
    cache_capacity: usize,
    next_id: AtomicU64,
    next_generation: AtomicU64,
    pending: Arc<PendingCalls<ThreadResponse>>,
    slot: Arc<Mutex<WorkerSlot>>,
}

impl ThreadChannel {
    pub fn new(binder: Arc<dyn LibraryBinder>, cache_capacity: usize) -> Self {
        Self {
            binder,
            cache_capacity,
            next_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
            pending: Arc::new(PendingCalls::new()),
            slot: Arc::new(Mutex::new(WorkerSlot::new())),
        }
    }

    /// Forward a call to the worker, starting it if needed
    pub fn submit(
        &self,
        library_path: &str,
        binding_descriptor: Arc<BindingDescriptor>,
        fn_name: &str,
        args: Vec<Value>,
        callsite: String,
    ) -> CallFuture {
        let (sender, generation) = match self.ensure_worker() {
            Ok(worker) => worker,
            Err(err) => return future::ready(Err(err)).boxed(),
        };

        let id: CallId = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self.pending.register(id, generation);
        let request = ThreadRequest {
            id,
            library_path: library_path.to_string(),
            binding_descriptor,
            fn_name: fn_name.to_string(),
            args,
            callsite,
        };

        if sender.send(WorkerMessage::Call(request)).is_err() {
            self.pending.remove(id);
            return future::ready(Err(RuntimeError::Worker("worker thread is not running".into()))).boxed();
        }
        debug!(id, function = %fn_name, "call forwarded to worker");

        async move {
            match response.await {
                Ok(ThreadResponse::Ok { result, .. }) => Ok(result),
                Ok(ThreadResponse::Err {
                    error,
                    error_callsite,
                    ..
                }) => Err(RuntimeError::remote(error.with_callsite(error_callsite))),
                Err(_) => Err(RuntimeError::Worker("worker dropped the call".into())),
            }
        }
        .boxed()
    }

    fn ensure_worker(&self) -> RuntimeResult<(flume::Sender<WorkerMessage>, u64)> {
        let mut slot = self.slot.lock();
        if let (false, Some(sender)) = (slot.state.needs_start(), slot.sender.as_ref()) {
            return Ok((sender.clone(), slot.generation));
        }

        // A dead worker's handle is finished or finishing; detach it
        slot.handle = None;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = flume::unbounded();
        let context = WorkerContext {
            generation,
            pending: Arc::clone(&self.pending),
            slot: Arc::clone(&self.slot),
            binder: Arc::clone(&self.binder),
            cache_capacity: self.cache_capacity,
        };

        slot.state = ChannelState::Starting;
        let handle = thread::Builder::new()
            .name(format!("relaxnative-worker-{}", generation))
            .spawn(move || worker::run(receiver, context))
            .map_err(|e| {
                slot.state = ChannelState::Absent;
                RuntimeError::Worker(format!("failed to start worker thread: {}", e))
            })?;

        slot.generation = generation;
        slot.sender = Some(sender.clone());
        slot.handle = Some(handle);
        slot.state = ChannelState::Connected;
        info!(generation, "worker thread spawned");

        Ok((sender, generation))
    }

    /// Stop the worker after queued calls drain; the next call starts a new one
    pub fn stop(&self) {
        let handle = {
            let mut slot = self.slot.lock();
            if let Some(sender) = slot.sender.take() {
                let _ = sender.send(WorkerMessage::Shutdown);
            }
            if slot.state != ChannelState::Absent {
                slot.state = ChannelState::Exited;
            }
            slot.handle.take()
        };

        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    pub fn state(&self) -> ChannelState {
        self.slot.lock().state
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for ThreadChannel {
    fn drop(&mut self) {
        if let Some(sender) = self.slot.lock().sender.take() {
            let _ = sender.send(WorkerMessage::Shutdown);
        }
    }
}
