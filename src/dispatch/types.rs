/*!
 * Dispatch Types
 * Isolation modes and the result shape of a dispatched call
 */

use crate::core::errors::{RuntimeError, RuntimeResult};
use crate::core::types::Value;
use crate::isolation::CallFuture;
use futures::future::{self, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::IntoFuture;
use std::str::FromStr;

/// Where a native call runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Isolation {
    /// On the caller's thread
    #[default]
    InProcess,
    /// On the shared worker thread
    #[serde(rename = "worker", alias = "thread")]
    Thread,
    /// In the supervised helper process
    Process,
}

impl Isolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProcess => "in-process",
            Self::Thread => "worker",
            Self::Process => "process",
        }
    }

    /// Calls always complete asynchronously
    pub fn is_isolated(&self) -> bool {
        !matches!(self, Self::InProcess)
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Isolation {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in-process" | "inprocess" | "direct" => Ok(Self::InProcess),
            "worker" | "thread" => Ok(Self::Thread),
            "process" => Ok(Self::Process),
            other => Err(RuntimeError::Config(format!(
                "unknown isolation '{}' (expected in-process, worker or process)",
                other
            ))),
        }
    }
}

/// Result of `NativeModule::call`
///
/// In-process calls complete before `call` returns. Isolated calls are
/// always `Pending`, even when the worker path could run them inline.
#[must_use = "a pending invocation does nothing until awaited"]
pub enum Invocation {
    Ready(RuntimeResult<Value>),
    Pending(CallFuture),
}

impl Invocation {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The result of a ready invocation, or the invocation back if pending
    pub fn into_ready(self) -> Result<RuntimeResult<Value>, Self> {
        match self {
            Self::Ready(result) => Ok(result),
            pending => Err(pending),
        }
    }
}

impl IntoFuture for Invocation {
    type Output = RuntimeResult<Value>;
    type IntoFuture = CallFuture;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Ready(result) => future::ready(result).boxed(),
            Self::Pending(future) => future,
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}
