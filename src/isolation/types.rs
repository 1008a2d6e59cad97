/*!
 * Isolation Types
 * Channel lifecycle, pending-call correlation and isolation errors
 */

use crate::core::errors::RuntimeResult;
use crate::core::types::{CallId, Value};
use futures::future::BoxFuture;
use ahash::RandomState;
use dashmap::DashMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;

/// Result of a call that completes off the caller's thread
pub type CallFuture = BoxFuture<'static, RuntimeResult<Value>>;

/// Failure class of a process-isolated call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationErrorKind {
    /// Helper died from a signal, or was killed on timeout
    Crash,
    /// Helper exited with a status code
    Exit,
    StartFailed,
    ProtocolError,
}

impl IsolationErrorKind {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Crash => "ISOLATED_PROCESS_CRASH",
            Self::Exit => "ISOLATED_PROCESS_EXIT",
            Self::StartFailed => "ISOLATED_PROCESS_START_FAILED",
            Self::ProtocolError => "ISOLATED_PROCESS_PROTOCOL_ERROR",
        }
    }
}

/// Process isolation error
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[error("{message}")]
#[diagnostic(
    code(isolation::process),
    help("The call was not retried. The next call starts a fresh helper.")
)]
pub struct IsolationError {
    pub kind: IsolationErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn or_null<T: fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
}

impl IsolationError {
    fn new(kind: IsolationErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            exit_code: None,
            signal: None,
            timeout_ms: None,
        }
    }

    /// Helper terminated; a signal makes it a crash, a status code an exit
    pub fn terminated(exit_code: Option<i32>, signal: Option<i32>) -> Self {
        let kind = if signal.is_some() {
            IsolationErrorKind::Crash
        } else {
            IsolationErrorKind::Exit
        };
        Self {
            exit_code,
            signal,
            ..Self::new(
                kind,
                format!(
                    "Isolated runtime exited (code={}, signal={})",
                    or_null(exit_code),
                    or_null(signal)
                ),
            )
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            timeout_ms: Some(timeout_ms),
            ..Self::new(
                IsolationErrorKind::Crash,
                format!("Isolated runtime exceeded timeout ({}ms)", timeout_ms),
            )
        }
    }

    pub fn start_failed(detail: impl fmt::Display) -> Self {
        Self::new(
            IsolationErrorKind::StartFailed,
            format!("Failed to start isolated runtime: {}", detail),
        )
    }

    pub fn protocol(detail: impl fmt::Display) -> Self {
        Self::new(
            IsolationErrorKind::ProtocolError,
            format!("Isolated runtime protocol error: {}", detail),
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.timeout_ms.is_some()
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Stable kind name
    pub fn name(&self) -> &'static str {
        "ProcessIsolationError"
    }
}

/// Lifecycle of a worker thread or helper process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Absent,
    Starting,
    Connected,
    Exited,
    Crashed,
}

impl ChannelState {
    /// A new executor is started on the next call
    pub fn needs_start(&self) -> bool {
        !matches!(self, Self::Starting | Self::Connected)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Starting => "starting",
            Self::Connected => "connected",
            Self::Exited => "exited",
            Self::Crashed => "crashed",
        })
    }
}

/// An in-flight call awaiting its correlated response
pub struct PendingCall<T> {
    /// Executor generation that owns the call
    pub generation: u64,
    pub responder: oneshot::Sender<T>,
}

/// Pending calls by id
pub struct PendingCalls<T> {
    calls: DashMap<CallId, PendingCall<T>, RandomState>,
}

impl<T> PendingCalls<T> {
    pub fn new() -> Self {
        Self {
            calls: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn register(&self, id: CallId, generation: u64) -> oneshot::Receiver<T> {
        let (responder, receiver) = oneshot::channel();
        self.calls.insert(id, PendingCall { generation, responder });
        receiver
    }

    /// Resolve a call owned by `generation`; stray or foreign ids are ignored
    pub fn complete(&self, id: CallId, generation: u64, value: T) -> bool {
        match self.calls.remove_if(&id, |_, call| call.generation == generation) {
            Some((_, call)) => call.responder.send(value).is_ok(),
            None => false,
        }
    }

    pub fn remove(&self, id: CallId) -> Option<PendingCall<T>> {
        self.calls.remove(&id).map(|(_, call)| call)
    }

    /// Reject every call owned by `generation`, leaving other generations alone
    pub fn reject_generation(&self, generation: u64, mut make: impl FnMut(CallId) -> T) -> usize {
        let ids: Vec<CallId> = self
            .calls
            .iter()
            .filter(|entry| entry.generation == generation)
            .map(|entry| *entry.key())
            .collect();

        let mut rejected = 0;
        for id in ids {
            if let Some((_, call)) = self.calls.remove(&id) {
                let _ = call.responder.send(make(id));
                rejected += 1;
            }
        }
        rejected
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl<T> Default for PendingCalls<T> {
    fn default() -> Self {
        Self::new()
    }
}
