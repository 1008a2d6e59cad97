/*!
 * NativeBuffer
 * Caller-owned allocation with explicit, one-shot release
 *
 * Every accessor checks liveness first. Releasing takes the region's write
 * lock, so a buffer cannot be freed while a native call holds it.
 */

use super::element::Element;
use super::types::{AllocOptions, BufferInfo, MemoryError, MemoryResult, Ownership};
use crate::core::limits::BUFFER_ALIGNMENT;
use crate::core::types::Address;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) struct RawAllocation {
    ptr: NonNull<u8>,
    layout: Layout,
}

// Safety: the region is plain bytes; access is serialized through the RwLock
unsafe impl Send for RawAllocation {}
unsafe impl Sync for RawAllocation {}

impl RawAllocation {
    fn address(&self) -> Address {
        self.ptr.as_ptr() as Address
    }

    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr() as *mut c_void
    }

    /// Safety: must be called at most once per allocation
    unsafe fn release(self) {
        dealloc(self.ptr.as_ptr(), self.layout);
    }
}

struct BufferInner {
    size: usize,
    auto_free: bool,
    region: RwLock<Option<RawAllocation>>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        let Some(region) = self.region.get_mut().take() else {
            return;
        };
        if self.auto_free {
            debug!(address = region.address(), size = self.size, "auto-freeing NativeBuffer");
            // Safety: last handle is gone and the region was never released
            unsafe { region.release() };
        } else {
            warn!(
                address = region.address(),
                size = self.size,
                "NativeBuffer dropped without free(); allocation leaked"
            );
        }
    }
}

/// Read lease on a live buffer region
pub(crate) type BufferLease<'a> = MappedRwLockReadGuard<'a, RawAllocation>;

/// Owned native allocation shared by cheap clones
#[derive(Clone)]
pub struct NativeBuffer {
    inner: Arc<BufferInner>,
}

impl NativeBuffer {
    /// Allocate `size` zeroed bytes
    pub fn alloc(size: usize) -> MemoryResult<Self> {
        Self::alloc_with(size, AllocOptions::default())
    }

    pub fn alloc_with(size: usize, options: AllocOptions) -> MemoryResult<Self> {
        if size == 0 {
            return Err(MemoryError::InvalidSize(
                "size must be a positive integer, got 0".to_string(),
            ));
        }
        let layout = Layout::from_size_align(size, BUFFER_ALIGNMENT).map_err(|_| {
            MemoryError::InvalidSize(format!("{} bytes exceeds the addressable range", size))
        })?;

        // Safety: layout has non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(MemoryError::AllocationFailed(size))?;

        debug!(
            address = ptr.as_ptr() as Address,
            size,
            auto_free = options.auto_free,
            "NativeBuffer allocated"
        );

        Ok(Self {
            inner: Arc::new(BufferInner {
                size,
                auto_free: options.auto_free,
                region: RwLock::new(Some(RawAllocation { ptr, layout })),
            }),
        })
    }

    /// Allocate from a dynamically typed size
    pub fn alloc_f64(size: f64, options: AllocOptions) -> MemoryResult<Self> {
        if !size.is_finite() || size.fract() != 0.0 || size <= 0.0 || size > usize::MAX as f64 {
            return Err(MemoryError::InvalidSize(format!(
                "size must be a positive integer, got {}",
                size
            )));
        }
        Self::alloc_with(size as usize, options)
    }

    pub fn address(&self) -> MemoryResult<Address> {
        let region = self.inner.region.read_recursive();
        let region = region.as_ref().ok_or(MemoryError::UseAfterFree)?;
        match region.address() {
            0 => Err(MemoryError::NullPointer("NativeBuffer".to_string())),
            address => Ok(address),
        }
    }

    pub fn size(&self) -> MemoryResult<usize> {
        self.ensure_alive()?;
        Ok(self.inner.size)
    }

    /// Allocation metadata; still answers after `free()`, like `is_freed`
    pub fn ownership(&self) -> Ownership {
        Ownership::Caller
    }

    pub fn is_freed(&self) -> bool {
        self.inner.region.read_recursive().is_none()
    }

    /// Allocation metadata; still answers after `free()`
    pub fn auto_free(&self) -> bool {
        self.inner.auto_free
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn info(&self) -> MemoryResult<BufferInfo> {
        Ok(BufferInfo {
            address: self.address()?,
            size: self.inner.size,
            ownership: self.ownership(),
        })
    }

    fn ensure_alive(&self) -> MemoryResult<()> {
        if self.is_freed() {
            return Err(MemoryError::UseAfterFree);
        }
        Ok(())
    }

    fn check_range(&self, offset: usize, len: usize) -> MemoryResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.inner.size => Ok(()),
            _ => Err(MemoryError::OutOfBounds {
                offset,
                len,
                size: self.inner.size,
            }),
        }
    }

    /// Element count for a typed access; defaults to the remaining whole elements
    fn element_span<T: Element>(&self, offset: usize, len: Option<usize>) -> MemoryResult<usize> {
        let width = T::SCALAR.width();
        if offset % width != 0 {
            return Err(MemoryError::Misaligned { offset, align: width });
        }
        if offset > self.inner.size {
            return Err(MemoryError::OutOfBounds {
                offset,
                len: 0,
                size: self.inner.size,
            });
        }
        let max_len = (self.inner.size - offset) / width;
        let len = len.unwrap_or(max_len);
        if len > max_len {
            return Err(MemoryError::OutOfBounds {
                offset,
                len: len.saturating_mul(width),
                size: self.inner.size,
            });
        }
        Ok(len)
    }

    /// Copy `bytes` into the buffer at `offset`
    pub fn write(&self, bytes: &[u8], offset: usize) -> MemoryResult<()> {
        let region = self.inner.region.write();
        let region = region.as_ref().ok_or(MemoryError::UseAfterFree)?;
        self.check_range(offset, bytes.len())?;
        // Safety: range checked against the allocation; exclusive lock held
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), region.ptr.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }

    /// Copy of `len` bytes starting at `offset` (rest of the buffer when `None`)
    pub fn bytes(&self, offset: usize, len: Option<usize>) -> MemoryResult<Vec<u8>> {
        let region = self.inner.region.read();
        let region = region.as_ref().ok_or(MemoryError::UseAfterFree)?;
        if offset > self.inner.size {
            return Err(MemoryError::OutOfBounds {
                offset,
                len: 0,
                size: self.inner.size,
            });
        }
        let len = len.unwrap_or(self.inner.size - offset);
        self.check_range(offset, len)?;
        let mut out = vec![0u8; len];
        // Safety: range checked against the allocation
        unsafe {
            std::ptr::copy_nonoverlapping(region.ptr.as_ptr().add(offset), out.as_mut_ptr(), len);
        }
        Ok(out)
    }

    pub fn to_vec(&self) -> MemoryResult<Vec<u8>> {
        self.bytes(0, None)
    }

    /// Copy out a typed view of `len` elements at `offset`
    pub fn read<T: Element>(&self, offset: usize, len: Option<usize>) -> MemoryResult<Vec<T>> {
        self.with_view(offset, len, |view: &[T]| view.to_vec())
    }

    /// Copy typed `values` in at `offset`
    pub fn write_slice<T: Element>(&self, offset: usize, values: &[T]) -> MemoryResult<()> {
        self.with_view_mut(offset, Some(values.len()), |view: &mut [T]| {
            view.copy_from_slice(values)
        })
    }

    /// Borrow a typed view for the duration of `f`
    pub fn with_view<T: Element, R>(
        &self,
        offset: usize,
        len: Option<usize>,
        f: impl FnOnce(&[T]) -> R,
    ) -> MemoryResult<R> {
        let region = self.inner.region.read();
        let region = region.as_ref().ok_or(MemoryError::UseAfterFree)?;
        let len = self.element_span::<T>(offset, len)?;
        // Safety: base is 16-byte aligned, offset is element aligned, span is in bounds
        let view = unsafe {
            std::slice::from_raw_parts(region.ptr.as_ptr().add(offset) as *const T, len)
        };
        Ok(f(view))
    }

    /// Mutably borrow a typed view for the duration of `f`
    pub fn with_view_mut<T: Element, R>(
        &self,
        offset: usize,
        len: Option<usize>,
        f: impl FnOnce(&mut [T]) -> R,
    ) -> MemoryResult<R> {
        let region = self.inner.region.write();
        let region = region.as_ref().ok_or(MemoryError::UseAfterFree)?;
        let len = self.element_span::<T>(offset, len)?;
        // Safety: as in with_view, plus the write lock excludes every other accessor
        let view = unsafe {
            std::slice::from_raw_parts_mut(region.ptr.as_ptr().add(offset) as *mut T, len)
        };
        Ok(f(view))
    }

    /// Release the allocation; exactly one call succeeds
    pub fn free(&self) -> MemoryResult<()> {
        let mut region = self.inner.region.write();
        let taken = region.take().ok_or(MemoryError::DoubleFree)?;
        debug!(address = taken.address(), size = self.inner.size, "NativeBuffer freed");
        // Safety: taken out of the slot, so no other path can release it again
        unsafe { taken.release() };
        Ok(())
    }

    /// Hold the region alive for a native call
    ///
    /// Recursive read so the same buffer may appear in several arguments.
    pub(crate) fn lease(&self) -> MemoryResult<BufferLease<'_>> {
        let guard = self.inner.region.read_recursive();
        RwLockReadGuard::try_map(guard, |region| region.as_ref()).map_err(|_| MemoryError::UseAfterFree)
    }

    pub fn to_debug_string(&self) -> String {
        match self.address() {
            Ok(address) => format!(
                "NativeBuffer(address=0x{:x}, size={}, ownership={}{})",
                address,
                self.inner.size,
                self.ownership(),
                if self.inner.auto_free { ", autoFree" } else { "" }
            ),
            Err(_) => format!("NativeBuffer(size={}, freed)", self.inner.size),
        }
    }
}

macro_rules! typed_accessors {
    ($($name:ident => $ty:ty),* $(,)?) => {
        impl NativeBuffer {
            $(
                #[doc = concat!("Copy of the `", stringify!($ty), "` view at `offset`")]
                pub fn $name(&self, offset: usize, len: Option<usize>) -> MemoryResult<Vec<$ty>> {
                    self.read::<$ty>(offset, len)
                }
            )*
        }
    };
}

typed_accessors! {
    u8 => u8,
    i8 => i8,
    u16 => u16,
    i16 => i16,
    u32 => u32,
    i32 => i32,
    u64 => u64,
    i64 => i64,
    f32 => f32,
    f64 => f64,
}

impl PartialEq for NativeBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_debug_string())
    }
}

impl fmt::Display for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_debug_string())
    }
}
