/*!
 * NativePointer
 * Opaque foreign address produced by native code
 */

use super::types::{MemoryError, MemoryResult, Ownership};
use crate::core::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read-only handle to memory this runtime did not allocate
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativePointer {
    address: Address,
    /// Size in bytes when known (0 means unknown)
    size: usize,
    ownership: Ownership,
}

impl NativePointer {
    pub fn new(address: Address, size: usize, ownership: Ownership) -> MemoryResult<Self> {
        if address == 0 {
            return Err(MemoryError::NullPointer("NativePointer".to_string()));
        }
        Ok(Self {
            address,
            size,
            ownership,
        })
    }

    /// Pointer returned by a native function, valid per its producer's contract
    pub fn borrowed(address: Address) -> MemoryResult<Self> {
        Self::new(address, 0, Ownership::Borrowed)
    }

    pub fn native(address: Address, size: usize) -> MemoryResult<Self> {
        Self::new(address, size, Ownership::Native)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Always fails: the allocator behind a foreign pointer is unknown
    pub fn free(&self) -> MemoryResult<()> {
        Err(MemoryError::ForeignPointer)
    }
}

impl fmt::Debug for NativePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NativePointer(address=0x{:x}, size={}, ownership={})",
            self.address, self.size, self.ownership
        )
    }
}
