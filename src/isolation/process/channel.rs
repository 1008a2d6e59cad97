/*!
 * Helper Channel
 * Supervises the helper process and correlates its responses by call id
 *
 * One helper is shared by every process-isolated module. It is spawned on
 * the first call and must answer a ping before any call is written. When
 * it exits, every call pending on that helper is rejected and the next call
 * spawns a fresh one.
 */

use super::protocol::{
    apply_copy_back, decode_body, encode_frame, from_wire, read_body, to_wire, write_encoded, CallRequest,
    FrameIdentity, WireRequest, WireResponse,
};
use crate::core::config::RuntimeConfig;
use crate::core::errors::{ErrorPayload, RuntimeError, RuntimeResult};
use crate::core::types::{CallId, Value};
use crate::ffi::BindingDescriptor;
use crate::isolation::types::{CallFuture, ChannelState, IsolationError, IsolationErrorKind, PendingCalls};
use crate::memory::MemoryResult;
use crate::security::SafetyMetadata;
use futures::future::FutureExt;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

type Delivery = Result<WireResponse, IsolationError>;

/// One spawned helper
struct HelperHandle {
    generation: u64,
    pid: Option<u32>,
    writer: AsyncMutex<Option<ChildStdin>>,
    alive: AtomicBool,
    exit_error: parking_lot::Mutex<Option<IsolationError>>,
}

impl HelperHandle {
    async fn send(&self, frame: &[u8]) -> Result<(), IsolationError> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(stdin) => write_encoded(stdin, frame).await,
            None => Err(IsolationError::protocol("helper input is closed")),
        }
    }

    /// SIGKILL the helper; later calls start a new one without waiting for EOF
    fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(pid) = self.pid {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                warn!(pid, error = %e, "failed to kill helper");
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn death(&self) -> IsolationError {
        self.exit_error
            .lock()
            .clone()
            .unwrap_or_else(|| IsolationError::protocol("helper is not running"))
    }
}

struct Shared {
    config: RuntimeConfig,
    next_id: AtomicU64,
    next_generation: AtomicU64,
    pending: PendingCalls<Delivery>,
    current: AsyncMutex<Option<Arc<HelperHandle>>>,
    state: parking_lot::Mutex<ChannelState>,
}

/// Marks the helper dead and rejects its calls, also when the reader task is cancelled
struct ReaderExit {
    shared: Arc<Shared>,
    handle: Arc<HelperHandle>,
}

impl Drop for ReaderExit {
    fn drop(&mut self) {
        self.handle.alive.store(false, Ordering::SeqCst);
        let death = self.handle.death();
        let rejected = self
            .shared
            .pending
            .reject_generation(self.handle.generation, |_| Err(death.clone()));
        if rejected > 0 {
            warn!(generation = self.handle.generation, rejected, "rejected calls pending on dead helper");
        }
    }
}

/// Process-isolated executor
pub struct ProcessChannel {
    shared: Arc<Shared>,
}

impl ProcessChannel {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                next_id: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
                pending: PendingCalls::new(),
                current: AsyncMutex::new(None),
                state: parking_lot::Mutex::new(ChannelState::Absent),
            }),
        }
    }

    /// Forward a call to the helper; resolves once the helper answers or dies
    pub fn submit(
        &self,
        library_path: &str,
        binding_descriptor: Arc<BindingDescriptor>,
        safety: Option<SafetyMetadata>,
        fn_name: &str,
        args: Vec<Value>,
        callsite: String,
    ) -> CallFuture {
        let shared = Arc::clone(&self.shared);
        let library_path = library_path.to_string();
        let fn_name = fn_name.to_string();

        async move {
            let wire_args = args.iter().map(to_wire).collect::<MemoryResult<Vec<_>>>()?;
            let timeout_ms = safety.as_ref().and_then(|s| s.limits.timeout_ms);
            let request = CallRequest {
                id: shared.next_id.fetch_add(1, Ordering::Relaxed),
                library_path,
                binding_descriptor: (*binding_descriptor).clone(),
                safety,
                fn_name,
                args: wire_args,
                callsite: Some(callsite.clone()),
            };

            let response = Shared::call(&shared, request, timeout_ms).await?;
            settle(response, &args, callsite)
        }
        .boxed()
    }

    /// Close the helper's input; it exits after answering queued calls
    pub async fn stop(&self) {
        let handle = self.shared.current.lock().await.take();
        if let Some(handle) = handle {
            info!(generation = handle.generation, pid = ?handle.pid, "stopping helper");
            handle.writer.lock().await.take();
            *self.shared.state.lock() = ChannelState::Exited;
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.lock()
    }

    /// Pid of the live helper, if any
    pub async fn helper_pid(&self) -> Option<u32> {
        self.shared
            .current
            .lock()
            .await
            .as_ref()
            .filter(|h| h.is_alive())
            .and_then(|h| h.pid)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if let Ok(mut current) = self.shared.current.try_lock() {
            if let Some(handle) = current.take() {
                if let Ok(mut writer) = handle.writer.try_lock() {
                    writer.take();
                }
            }
        }
    }
}

impl Shared {
    async fn call(this: &Arc<Self>, request: CallRequest, timeout_ms: Option<u64>) -> RuntimeResult<WireResponse> {
        let id = request.id;
        let frame = encode_frame(&WireRequest::Call(request))?;
        let handle = Self::ensure_helper(this).await?;
        let generation = handle.generation;
        let mut response = this.pending.register(id, generation);

        // The helper may have died between lookup and registration
        if !handle.is_alive() {
            this.pending.remove(id);
            return Err(handle.death().into());
        }

        // A broken pipe means the helper is dying; its exit status settles the call
        match handle.send(&frame).await {
            Ok(()) => debug!(id, generation, "call sent to helper"),
            Err(e) => warn!(id, generation, error = %e, "write to helper failed; awaiting its exit"),
        }

        let delivery = match timeout_ms {
            None => response.await,
            Some(ms) => {
                Self::arm_margin_timer(this, &handle, id, ms);
                match tokio::time::timeout(Duration::from_millis(ms), &mut response).await {
                    Ok(delivery) => delivery,
                    Err(_) => {
                        if this.pending.remove(id).is_some() {
                            error!(id, timeout_ms = ms, pid = ?handle.pid, "call exceeded timeout; killing helper");
                            handle.kill();
                            return Err(IsolationError::timeout(ms).into());
                        }
                        // Settled concurrently with the timer
                        response.await
                    }
                }
            }
        };

        match delivery {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(handle.death().into()),
        }
    }

    /// Rejects the call at `ms + margin` even if the caller's timer never runs
    fn arm_margin_timer(this: &Arc<Self>, handle: &Arc<HelperHandle>, id: CallId, ms: u64) {
        let shared = Arc::clone(this);
        let handle = Arc::clone(handle);
        let deadline = Duration::from_millis(ms) + this.config.timeout_margin;
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if shared.pending.complete(id, handle.generation, Err(IsolationError::timeout(ms))) {
                warn!(id, pid = ?handle.pid, "call rejected by timeout margin timer; killing helper");
                handle.kill();
            }
        });
    }

    async fn ensure_helper(this: &Arc<Self>) -> Result<Arc<HelperHandle>, IsolationError> {
        let mut current = this.current.lock().await;
        if let Some(handle) = current.as_ref().filter(|h| h.is_alive()) {
            return Ok(Arc::clone(handle));
        }

        *this.state.lock() = ChannelState::Starting;
        match Self::spawn_helper(this).await {
            Ok(handle) => {
                *current = Some(Arc::clone(&handle));
                *this.state.lock() = ChannelState::Connected;
                Ok(handle)
            }
            Err(e) => {
                error!(error = %e, "helper failed to start");
                *current = None;
                *this.state.lock() = ChannelState::Crashed;
                Err(e)
            }
        }
    }

    async fn spawn_helper(this: &Arc<Self>) -> Result<Arc<HelperHandle>, IsolationError> {
        let path = this.config.resolve_helper().ok_or_else(|| {
            IsolationError::start_failed("helper executable not found; set RELAXNATIVE_HELPER")
        })?;

        let mut child = Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| IsolationError::start_failed(format!("{}: {}", path.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| IsolationError::start_failed("helper stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| IsolationError::start_failed("helper stdout unavailable"))?;

        let handle = Arc::new(HelperHandle {
            generation: this.next_generation.fetch_add(1, Ordering::Relaxed),
            pid: child.id(),
            writer: AsyncMutex::new(Some(stdin)),
            alive: AtomicBool::new(true),
            exit_error: parking_lot::Mutex::new(None),
        });
        info!(generation = handle.generation, pid = ?handle.pid, path = %path.display(), "helper spawned");

        tokio::spawn(read_loop(Arc::clone(this), Arc::clone(&handle), stdout, child));

        // Nothing else is written before the ping round-trips
        let id = this.next_id.fetch_add(1, Ordering::Relaxed);
        let pong = this.pending.register(id, handle.generation);
        let sent = match encode_frame(&WireRequest::Ping { id }) {
            Ok(frame) => handle.send(&frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            this.pending.remove(id);
            handle.kill();
            return Err(IsolationError::start_failed(e.message));
        }

        match tokio::time::timeout(this.config.ping_timeout, pong).await {
            Ok(Ok(Ok(_))) => {
                debug!(generation = handle.generation, "helper answered ping");
                Ok(handle)
            }
            Ok(Ok(Err(e))) => Err(IsolationError::start_failed(e.message)),
            Ok(Err(_)) => Err(IsolationError::start_failed(handle.death().message)),
            Err(_) => {
                this.pending.remove(id);
                handle.kill();
                Err(IsolationError::start_failed(format!(
                    "no ping response within {:?}",
                    this.config.ping_timeout
                )))
            }
        }
    }
}

async fn read_loop(shared: Arc<Shared>, handle: Arc<HelperHandle>, mut stdout: ChildStdout, mut child: Child) {
    let generation = handle.generation;
    let exit = ReaderExit {
        shared: Arc::clone(&shared),
        handle: Arc::clone(&handle),
    };

    let failure = loop {
        let body = match read_body(&mut stdout).await {
            Ok(Some(body)) => body,
            Ok(None) => break None,
            Err(e) => break Some(e),
        };
        match decode_body::<WireResponse>(&body) {
            Ok(response) => {
                let id = response.id;
                if !shared.pending.complete(id, generation, Ok(response)) {
                    debug!(id, generation, "late or unknown helper response dropped");
                }
            }
            Err(e) => match FrameIdentity::recover(&body) {
                Some(FrameIdentity { id, .. }) => {
                    warn!(id, generation, error = %e, "undecodable helper response");
                    shared.pending.complete(id, generation, Err(e));
                }
                None => break Some(e),
            },
        }
    };

    let death = match failure {
        Some(e) => {
            error!(generation, error = %e, "helper protocol failure; killing helper");
            let _ = child.start_kill();
            let _ = child.wait().await;
            e
        }
        None => match child.wait().await {
            Ok(status) => IsolationError::terminated(status.code(), status.signal()),
            Err(e) => IsolationError::protocol(e),
        },
    };

    match death.kind {
        IsolationErrorKind::Crash => error!(generation, pid = ?handle.pid, reason = %death, "helper crashed"),
        _ => info!(generation, pid = ?handle.pid, reason = %death, "helper exited"),
    }
    let state = if death.kind == IsolationErrorKind::Crash {
        ChannelState::Crashed
    } else {
        ChannelState::Exited
    };
    *handle.exit_error.lock() = Some(death);
    drop(exit);

    let mut current = shared.current.lock().await;
    if current.as_ref().map(|h| h.generation) == Some(generation) {
        *current = None;
        *shared.state.lock() = state;
    }
}

/// Turn a helper response into the call result, copying binary arguments back
fn settle(response: WireResponse, originals: &[Value], callsite: String) -> RuntimeResult<Value> {
    if !response.ok {
        let payload = response
            .error
            .unwrap_or_else(|| ErrorPayload::new("ProtocolError", "helper reported failure without an error"));
        return Err(RuntimeError::remote(payload.with_callsite(Some(callsite))));
    }

    if let Some(args) = response.args {
        apply_copy_back(originals, args)?;
    }
    match response.result {
        Some(result) => Ok(from_wire(result)?),
        None => Ok(Value::Void),
    }
}
