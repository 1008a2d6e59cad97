/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// Re-export subsystem errors
pub use crate::ffi::FfiError;
pub use crate::isolation::IsolationError;
pub use crate::memory::MemoryError;
pub use crate::security::SecurityError;

/// Serialized form of an error crossing a channel boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable error kind name, e.g. `UseAfterFreeError`
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Caller-side location that issued the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callsite: Option<String>,
}

impl ErrorPayload {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            callsite: None,
        }
    }

    pub fn with_callsite(mut self, callsite: Option<String>) -> Self {
        if self.callsite.is_none() {
            self.callsite = callsite;
        }
        self
    }
}

/// Error raised on the far side of a worker or helper channel
#[derive(Debug, Clone, PartialEq, Eq, Diagnostic)]
#[diagnostic(
    code(runtime::remote_error),
    help("The native call failed inside an isolated executor. The callsite shows where it was issued.")
)]
pub struct RemoteError {
    payload: ErrorPayload,
}

impl RemoteError {
    pub fn new(payload: ErrorPayload) -> Self {
        Self { payload }
    }

    pub fn name(&self) -> &str {
        &self.payload.name
    }

    pub fn payload(&self) -> &ErrorPayload {
        &self.payload
    }

    pub fn into_payload(self) -> ErrorPayload {
        self.payload
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.payload.name, self.payload.message)?;
        if let Some(callsite) = &self.payload.callsite {
            write!(f, "\n--- remote callsite ---\n{}", callsite)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

/// Unified runtime error type with miette diagnostics
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Ffi(#[from] FfiError),

    #[error(transparent)]
    Isolation(#[from] IsolationError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Function not found: {name}. Available exports: [{}]", .exports.join(", "))]
    MissingFunction { name: String, exports: Vec<String> },

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// Written out instead of derived: `IsolationError` has an inherent `code()`
// that shadows `Diagnostic::code` in the derive's transparent forwarding.
impl RuntimeError {
    fn transparent(&self) -> Option<&dyn Diagnostic> {
        match self {
            Self::Memory(e) => Some(e),
            Self::Ffi(e) => Some(e),
            Self::Isolation(e) => Some(e),
            Self::Security(e) => Some(e),
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl Diagnostic for RuntimeError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        if let Some(inner) = self.transparent() {
            return inner.code();
        }
        match self {
            Self::MissingFunction { .. } => Some(Box::new("dispatch::missing_function")),
            Self::Worker(_) => Some(Box::new("runtime::worker")),
            Self::Config(_) => Some(Box::new("runtime::config")),
            _ => None,
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        if let Some(inner) = self.transparent() {
            return inner.help();
        }
        match self {
            Self::MissingFunction { .. } => Some(Box::new(
                "Check the binding descriptor; in-process modules only expose bound functions.",
            )),
            Self::Worker(_) => Some(Box::new(
                "The isolation worker thread is unavailable. The next call starts a fresh one.",
            )),
            _ => None,
        }
    }

    fn url<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.transparent().and_then(|inner| inner.url())
    }

    fn severity(&self) -> Option<miette::Severity> {
        self.transparent().and_then(|inner| inner.severity())
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        self.transparent().and_then(|inner| inner.labels())
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.transparent().and_then(|inner| inner.source_code())
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        self.transparent().and_then(|inner| inner.related())
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        self.transparent().and_then(|inner| inner.diagnostic_source())
    }
}

impl RuntimeError {
    /// Stable kind name, preserved across channel boundaries
    pub fn name(&self) -> &str {
        match self {
            Self::Memory(e) => e.name(),
            Self::Ffi(e) => e.name(),
            Self::Isolation(e) => e.name(),
            Self::Security(e) => e.name(),
            Self::Remote(e) => e.name(),
            Self::MissingFunction { .. } => "MissingFunctionError",
            Self::Worker(_) => "WorkerError",
            Self::Config(_) => "ConfigError",
        }
    }

    /// Serialize for transport, attaching the caller callsite
    pub fn to_payload(&self, callsite: Option<String>) -> ErrorPayload {
        match self {
            Self::Remote(e) => e.payload().clone().with_callsite(callsite),
            other => ErrorPayload::new(other.name(), other.to_string()).with_callsite(callsite),
        }
    }

    pub fn remote(payload: ErrorPayload) -> Self {
        Self::Remote(RemoteError::new(payload))
    }

    pub fn as_isolation(&self) -> Option<&IsolationError> {
        match self {
            Self::Isolation(e) => Some(e),
            _ => None,
        }
    }
}

/// Common result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
