/*!
 * Typed Elements
 * Scalar element trait and caller-side typed views
 */

use super::types::{MemoryError, MemoryResult};
use crate::core::types::ScalarType;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width scalar that can live in a typed view or a NativeBuffer
pub trait Element: sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const SCALAR: ScalarType;

    fn slice(data: &ViewData) -> Option<&[Self]>;
    fn slice_mut(data: &mut ViewData) -> Option<&mut [Self]>;
    fn wrap(values: Vec<Self>) -> ViewData;
    /// Numeric conversion with `as` semantics
    fn from_f64(v: f64) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Element for $ty {
                const SCALAR: ScalarType = ScalarType::$variant;

                fn slice(data: &ViewData) -> Option<&[Self]> {
                    match data {
                        ViewData::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn slice_mut(data: &mut ViewData) -> Option<&mut [Self]> {
                    match data {
                        ViewData::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn wrap(values: Vec<Self>) -> ViewData {
                    ViewData::$variant(values)
                }

                fn from_f64(v: f64) -> Self {
                    v as $ty
                }
            }
        )*
    };
}

impl_element! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// Backing storage of a typed view, one variant per element type
#[derive(Debug, Clone, PartialEq)]
pub enum ViewData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_view {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ViewData::I8($v) => $body,
            ViewData::U8($v) => $body,
            ViewData::I16($v) => $body,
            ViewData::U16($v) => $body,
            ViewData::I32($v) => $body,
            ViewData::U32($v) => $body,
            ViewData::I64($v) => $body,
            ViewData::U64($v) => $body,
            ViewData::F32($v) => $body,
            ViewData::F64($v) => $body,
        }
    };
}

fn decode<T, const N: usize>(bytes: &[u8], from: fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            from(raw)
        })
        .collect()
}

impl ViewData {
    pub fn zeroed(ty: ScalarType, len: usize) -> Self {
        match ty {
            ScalarType::I8 => Self::I8(vec![0; len]),
            ScalarType::U8 => Self::U8(vec![0; len]),
            ScalarType::I16 => Self::I16(vec![0; len]),
            ScalarType::U16 => Self::U16(vec![0; len]),
            ScalarType::I32 => Self::I32(vec![0; len]),
            ScalarType::U32 => Self::U32(vec![0; len]),
            ScalarType::I64 => Self::I64(vec![0; len]),
            ScalarType::U64 => Self::U64(vec![0; len]),
            ScalarType::F32 => Self::F32(vec![0.0; len]),
            ScalarType::F64 => Self::F64(vec![0.0; len]),
        }
    }

    /// Fresh view holding `values` converted to `ty`
    pub fn from_f64s(ty: ScalarType, values: &[f64]) -> Self {
        fn conv<T: Element>(values: &[f64]) -> ViewData {
            T::wrap(values.iter().map(|v| T::from_f64(*v)).collect())
        }
        match ty {
            ScalarType::I8 => conv::<i8>(values),
            ScalarType::U8 => conv::<u8>(values),
            ScalarType::I16 => conv::<i16>(values),
            ScalarType::U16 => conv::<u16>(values),
            ScalarType::I32 => conv::<i32>(values),
            ScalarType::U32 => conv::<u32>(values),
            ScalarType::I64 => conv::<i64>(values),
            ScalarType::U64 => conv::<u64>(values),
            ScalarType::F32 => conv::<f32>(values),
            ScalarType::F64 => conv::<f64>(values),
        }
    }

    /// Decode native-endian bytes; the length must be a multiple of the element width
    pub fn from_bytes(ty: ScalarType, bytes: &[u8]) -> MemoryResult<Self> {
        let width = ty.width();
        if bytes.len() % width != 0 {
            return Err(MemoryError::Misaligned {
                offset: bytes.len(),
                align: width,
            });
        }
        let data = match ty {
            ScalarType::I8 => Self::I8(decode(bytes, i8::from_ne_bytes)),
            ScalarType::U8 => Self::U8(bytes.to_vec()),
            ScalarType::I16 => Self::I16(decode(bytes, i16::from_ne_bytes)),
            ScalarType::U16 => Self::U16(decode(bytes, u16::from_ne_bytes)),
            ScalarType::I32 => Self::I32(decode(bytes, i32::from_ne_bytes)),
            ScalarType::U32 => Self::U32(decode(bytes, u32::from_ne_bytes)),
            ScalarType::I64 => Self::I64(decode(bytes, i64::from_ne_bytes)),
            ScalarType::U64 => Self::U64(decode(bytes, u64::from_ne_bytes)),
            ScalarType::F32 => Self::F32(decode(bytes, f32::from_ne_bytes)),
            ScalarType::F64 => Self::F64(decode(bytes, f64::from_ne_bytes)),
        };
        Ok(data)
    }

    pub fn element_type(&self) -> ScalarType {
        match self {
            Self::I8(_) => ScalarType::I8,
            Self::U8(_) => ScalarType::U8,
            Self::I16(_) => ScalarType::I16,
            Self::U16(_) => ScalarType::U16,
            Self::I32(_) => ScalarType::I32,
            Self::U32(_) => ScalarType::U32,
            Self::I64(_) => ScalarType::I64,
            Self::U64(_) => ScalarType::U64,
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
        }
    }

    pub fn len(&self) -> usize {
        each_view!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.element_type().width()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        each_view!(self, v => v.iter().flat_map(|x| x.to_ne_bytes()).collect())
    }

    /// Overwrite in place from native-endian bytes of identical length
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) -> MemoryResult<()> {
        if bytes.len() != self.byte_len() {
            return Err(MemoryError::OutOfBounds {
                offset: 0,
                len: bytes.len(),
                size: self.byte_len(),
            });
        }
        *self = Self::from_bytes(self.element_type(), bytes)?;
        Ok(())
    }

    /// Base address of the storage; valid while `self` is neither moved nor resized
    pub(crate) fn as_mut_ptr(&mut self) -> *mut c_void {
        each_view!(self, v => v.as_mut_ptr() as *mut c_void)
    }
}

/// Shared, mutable typed view owned by the caller
///
/// Clones share storage. Native code receives a pointer to the storage for
/// the duration of a call and its writes are visible afterwards.
#[derive(Clone)]
pub struct TypedArray {
    inner: Arc<RwLock<ViewData>>,
}

impl TypedArray {
    pub fn new<T: Element>(values: Vec<T>) -> Self {
        Self::from_data(T::wrap(values))
    }

    pub fn from_data(data: ViewData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    pub fn zeroed(ty: ScalarType, len: usize) -> Self {
        Self::from_data(ViewData::zeroed(ty, len))
    }

    pub fn element_type(&self) -> ScalarType {
        self.inner.read().element_type()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the contents when `T` matches the element type
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        T::slice(&self.inner.read()).map(<[T]>::to_vec)
    }

    pub fn snapshot(&self) -> ViewData {
        self.inner.read().clone()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.read().to_bytes()
    }

    pub fn copy_from_bytes(&self, bytes: &[u8]) -> MemoryResult<()> {
        self.inner.write().copy_from_bytes(bytes)
    }

    /// Mutate the contents in place when `T` matches the element type
    pub fn with_mut<T: Element, R>(&self, f: impl FnOnce(&mut [T]) -> R) -> Option<R> {
        let mut guard = self.inner.write();
        T::slice_mut(&mut guard).map(f)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Exclusive access for the duration of a native call
    pub(crate) fn lock(&self) -> RwLockWriteGuard<'_, ViewData> {
        self.inner.write()
    }
}

impl PartialEq for TypedArray {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.inner.read() == *other.inner.read()
    }
}

impl fmt::Debug for TypedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.read();
        write!(f, "TypedArray<{}>[{}]", data.element_type(), data.len())
    }
}
