/*!
 * Worker Protocol
 * Messages exchanged between callers and the worker thread
 */

use crate::core::errors::ErrorPayload;
use crate::core::types::{CallId, Value};
use crate::ffi::BindingDescriptor;
use std::sync::Arc;

/// A call forwarded to the worker
#[derive(Debug)]
pub struct ThreadRequest {
    pub id: CallId,
    pub library_path: String,
    pub binding_descriptor: Arc<BindingDescriptor>,
    pub fn_name: String,
    /// Buffers and views are shared, so in-place writes are visible to the caller
    pub args: Vec<Value>,
    pub callsite: String,
}

#[derive(Debug)]
pub enum ThreadResponse {
    Ok {
        id: CallId,
        result: Value,
    },
    Err {
        id: CallId,
        error: ErrorPayload,
        error_callsite: Option<String>,
    },
}

impl ThreadResponse {
    pub fn id(&self) -> CallId {
        match self {
            Self::Ok { id, .. } | Self::Err { id, .. } => *id,
        }
    }

    pub fn failed(id: CallId, error: ErrorPayload, error_callsite: Option<String>) -> Self {
        Self::Err {
            id,
            error,
            error_callsite,
        }
    }
}

#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Call(ThreadRequest),
    Shutdown,
}
