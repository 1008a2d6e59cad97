/*!
 * Memory Traits
 * Release dispatch by runtime type
 */

use super::buffer::NativeBuffer;
use super::pointer::NativePointer;
use super::types::{MemoryError, MemoryResult};
use crate::core::types::Value;

/// Something `free()` knows how to release
pub trait Release {
    fn release(&self) -> MemoryResult<()>;
}

impl Release for NativeBuffer {
    fn release(&self) -> MemoryResult<()> {
        self.free()
    }
}

impl Release for NativePointer {
    fn release(&self) -> MemoryResult<()> {
        self.free()
    }
}

impl Release for Value {
    fn release(&self) -> MemoryResult<()> {
        match self {
            Value::Buffer(buf) => buf.free(),
            Value::Pointer(ptr) => ptr.free(),
            other => Err(MemoryError::NotFreeable(other.kind().to_string())),
        }
    }
}
