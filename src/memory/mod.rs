/*!
 * Memory Ownership
 * Explicit lifetime tracking for memory shared with native code
 */

mod buffer;
mod element;
mod pointer;
pub mod traits;
pub mod types;

pub use buffer::NativeBuffer;
pub(crate) use buffer::BufferLease;
pub use element::{Element, TypedArray, ViewData};
pub use pointer::NativePointer;
pub use traits::Release;
pub use types::{AllocOptions, BufferInfo, MemoryError, MemoryResult, Ownership};

/// Allocate a caller-owned buffer of `size` bytes
pub fn alloc(size: usize) -> MemoryResult<NativeBuffer> {
    NativeBuffer::alloc(size)
}

pub fn alloc_with(size: usize, options: AllocOptions) -> MemoryResult<NativeBuffer> {
    NativeBuffer::alloc_with(size, options)
}

/// Release a handle, dispatching on its runtime type
pub fn free<H: Release + ?Sized>(handle: &H) -> MemoryResult<()> {
    handle.release()
}
