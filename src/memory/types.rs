/*!
 * Memory Types
 * Ownership vocabulary and errors for memory shared with native code
 */

use crate::core::types::Address;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum MemoryError {
    #[error("Use-after-free: NativeBuffer was freed")]
    #[diagnostic(
        code(memory::use_after_free),
        help("The buffer was released with free(). Allocate a new one instead.")
    )]
    UseAfterFree,

    #[error("Double-free: NativeBuffer already freed")]
    #[diagnostic(code(memory::double_free))]
    DoubleFree,

    #[error("Invalid free: cannot free a raw NativePointer (unknown allocator)")]
    #[diagnostic(
        code(memory::foreign_pointer),
        help("Pointers returned by native code belong to the library that produced them.")
    )]
    ForeignPointer,

    #[error("free() expects a NativeBuffer or NativePointer, got {0}")]
    #[diagnostic(code(memory::not_freeable))]
    NotFreeable(String),

    #[error("Null pointer: {0} address is 0")]
    #[diagnostic(code(memory::null_pointer))]
    NullPointer(String),

    #[error("Invalid allocation size: {0}")]
    #[diagnostic(code(memory::invalid_size), help("Size must be a positive integer."))]
    InvalidSize(String),

    #[error("Out of bounds: {len} bytes at offset {offset} exceeds buffer size {size}")]
    #[diagnostic(code(memory::out_of_bounds))]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("offset must be aligned to {align} bytes (got {offset})")]
    #[diagnostic(code(memory::misaligned))]
    Misaligned { offset: usize, align: usize },

    #[error("Allocation of {0} bytes failed")]
    #[diagnostic(code(memory::allocation_failed), help("System may be low on memory."))]
    AllocationFailed(usize),
}

impl MemoryError {
    /// Stable kind name
    pub fn name(&self) -> &'static str {
        match self {
            Self::UseAfterFree => "UseAfterFreeError",
            Self::DoubleFree | Self::ForeignPointer => "InvalidFreeError",
            Self::NotFreeable(_) | Self::InvalidSize(_) => "TypeError",
            Self::NullPointer(_) => "NullPointerError",
            Self::OutOfBounds { .. } | Self::Misaligned { .. } => "RangeError",
            Self::AllocationFailed(_) => "AllocationError",
        }
    }
}

/// Who is responsible for releasing a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// Allocated by this runtime on behalf of the caller
    Caller,
    /// Allocated and owned by native code
    Native,
    /// Foreign memory lent for the duration of its producer's guarantees
    Borrowed,
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Caller => "caller",
            Self::Native => "native",
            Self::Borrowed => "borrowed",
        })
    }
}

/// Allocation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocOptions {
    /// Release the allocation when the last handle is dropped
    pub auto_free: bool,
}

impl AllocOptions {
    pub fn auto_free() -> Self {
        Self { auto_free: true }
    }
}

/// Serializable snapshot of a live buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInfo {
    pub address: Address,
    pub size: usize,
    pub ownership: Ownership,
}
