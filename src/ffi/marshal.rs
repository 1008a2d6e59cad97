/*!
 * Argument Marshalling
 * Runtime values to calling-convention slots and back
 *
 * A MarshalContext owns everything a call borrows: buffer leases, typed view
 * locks, temporary arrays, C strings and pointer tables. All of it lives
 * until the context is dropped after the native call returns.
 */

use super::types::{FfiError, FfiResult, NativeType};
use crate::core::errors::RuntimeResult;
use crate::core::types::{ScalarType, Value};
use crate::memory::{BufferLease, NativeBuffer, NativePointer, TypedArray, ViewData};
use libffi::middle::Arg;
use parking_lot::RwLockWriteGuard;
use std::ffi::{c_void, CStr, CString};

/// One marshalled argument
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Ptr(*mut c_void),
}

impl Slot {
    pub(crate) fn arg(&self) -> Arg {
        match self {
            Self::I8(v) => Arg::new(v),
            Self::U8(v) => Arg::new(v),
            Self::I16(v) => Arg::new(v),
            Self::U16(v) => Arg::new(v),
            Self::I32(v) => Arg::new(v),
            Self::U32(v) => Arg::new(v),
            Self::I64(v) => Arg::new(v),
            Self::U64(v) => Arg::new(v),
            Self::F32(v) => Arg::new(v),
            Self::F64(v) => Arg::new(v),
            Self::Ptr(v) => Arg::new(v),
        }
    }
}

pub(crate) struct MarshalContext<'a> {
    function: &'a str,
    leases: Vec<BufferLease<'a>>,
    views: Vec<(&'a TypedArray, RwLockWriteGuard<'a, ViewData>)>,
    scratch: Vec<ViewData>,
    strings: Vec<CString>,
    tables: Vec<Vec<usize>>,
}

impl<'a> MarshalContext<'a> {
    pub(crate) fn new(function: &'a str) -> Self {
        Self {
            function,
            leases: Vec::new(),
            views: Vec::new(),
            scratch: Vec::new(),
            strings: Vec::new(),
            tables: Vec::new(),
        }
    }

    fn invalid(&self, index: usize, reason: impl Into<String>) -> FfiError {
        FfiError::InvalidArgument {
            function: self.function.to_string(),
            index,
            reason: reason.into(),
        }
    }

    /// Marshal every argument before any native code runs
    pub(crate) fn marshal_all(&mut self, args: &'a [Value], types: &[NativeType]) -> RuntimeResult<Vec<Slot>> {
        if args.len() != types.len() {
            return Err(FfiError::ArityMismatch {
                function: self.function.to_string(),
                expected: types.len(),
                got: args.len(),
            }
            .into());
        }
        args.iter()
            .zip(types)
            .enumerate()
            .map(|(index, (value, ty))| self.marshal(index, value, ty))
            .collect()
    }

    fn marshal(&mut self, index: usize, value: &'a Value, ty: &NativeType) -> RuntimeResult<Slot> {
        match ty {
            NativeType::Void => Err(self.invalid(index, "void is not a valid argument type").into()),
            NativeType::Scalar(scalar) => Ok(self.scalar(index, value, *scalar)?),
            NativeType::CString => self.cstring(index, value),
            NativeType::Pointer(element) => self.pointer(index, value, Some(*element)),
            NativeType::OpaquePointer => self.pointer(index, value, None),
            NativeType::PointerTable => self.pointer_table(index, value),
        }
    }

    fn scalar(&self, index: usize, value: &Value, target: ScalarType) -> FfiResult<Slot> {
        if target.is_float() {
            let v = value
                .as_f64()
                .ok_or_else(|| self.invalid(index, format!("expected a number, got {}", value.kind())))?;
            return Ok(match target {
                ScalarType::F32 => Slot::F32(v as f32),
                _ => Slot::F64(v),
            });
        }

        let v = match value.as_i128() {
            Some(v) => v,
            None if value.as_f64().is_some() => {
                return Err(self.invalid(index, format!("expected an integer for {}, got {:?}", target, value)))
            }
            None => {
                return Err(self.invalid(index, format!("expected an integer, got {}", value.kind())))
            }
        };
        let out_of_range = || FfiError::OutOfRange {
            function: self.function.to_string(),
            index,
            value: v.to_string(),
            target: target.name().to_string(),
        };
        let slot = match target {
            ScalarType::I8 => Slot::I8(i8::try_from(v).map_err(|_| out_of_range())?),
            ScalarType::U8 => Slot::U8(u8::try_from(v).map_err(|_| out_of_range())?),
            ScalarType::I16 => Slot::I16(i16::try_from(v).map_err(|_| out_of_range())?),
            ScalarType::U16 => Slot::U16(u16::try_from(v).map_err(|_| out_of_range())?),
            ScalarType::I32 => Slot::I32(i32::try_from(v).map_err(|_| out_of_range())?),
            ScalarType::U32 => Slot::U32(u32::try_from(v).map_err(|_| out_of_range())?),
            ScalarType::I64 => Slot::I64(i64::try_from(v).map_err(|_| out_of_range())?),
            ScalarType::U64 => Slot::U64(u64::try_from(v).map_err(|_| out_of_range())?),
            ScalarType::F32 => Slot::F32(v as f32),
            ScalarType::F64 => Slot::F64(v as f64),
        };
        Ok(slot)
    }

    fn cstring(&mut self, index: usize, value: &'a Value) -> RuntimeResult<Slot> {
        match value {
            Value::Str(s) => {
                let c = CString::new(s.as_str())
                    .map_err(|_| self.invalid(index, "string contains an interior NUL byte"))?;
                // CString's heap storage does not move with the Vec
                let ptr = c.as_ptr() as *mut c_void;
                self.strings.push(c);
                Ok(Slot::Ptr(ptr))
            }
            Value::Null => Ok(Slot::Ptr(std::ptr::null_mut())),
            Value::Buffer(buf) => self.lease(buf),
            other => Err(self.invalid(index, format!("expected a string, got {}", other.kind())).into()),
        }
    }

    fn lease(&mut self, buf: &'a NativeBuffer) -> RuntimeResult<Slot> {
        Ok(Slot::Ptr(self.lease_ptr(buf)?))
    }

    fn lease_ptr(&mut self, buf: &'a NativeBuffer) -> RuntimeResult<*mut c_void> {
        let lease = buf.lease()?;
        let ptr = lease.as_ptr();
        self.leases.push(lease);
        Ok(ptr)
    }

    fn view_ptr(&mut self, view: &'a TypedArray) -> *mut c_void {
        if let Some((_, guard)) = self.views.iter_mut().find(|(held, _)| held.ptr_eq(view)) {
            return guard.as_mut_ptr();
        }
        let mut guard = view.lock();
        let ptr = guard.as_mut_ptr();
        self.views.push((view, guard));
        ptr
    }

    fn pointer(&mut self, index: usize, value: &'a Value, element: Option<ScalarType>) -> RuntimeResult<Slot> {
        match value {
            Value::Buffer(buf) => self.lease(buf),
            Value::Pointer(ptr) => Ok(Slot::Ptr(ptr.address() as *mut c_void)),
            Value::Null => Ok(Slot::Ptr(std::ptr::null_mut())),
            Value::View(view) => {
                if let Some(expected) = element {
                    let found = view.element_type();
                    if found != expected {
                        return Err(self
                            .invalid(index, format!("expected a {} view, got a {} view", expected, found))
                            .into());
                    }
                }
                Ok(Slot::Ptr(self.view_ptr(view)))
            }
            Value::Array(values) => {
                let element = element.ok_or_else(|| {
                    self.invalid(index, "plain arrays need a typed pointer<T> parameter")
                })?;
                let mut data = ViewData::from_f64s(element, values);
                let ptr = data.as_mut_ptr();
                self.scratch.push(data);
                Ok(Slot::Ptr(ptr))
            }
            other if other.as_f64().is_some() => Err(self
                .invalid(
                    index,
                    "bare numeric addresses are not accepted; pass a NativeBuffer, NativePointer or typed view",
                )
                .into()),
            other => Err(self
                .invalid(index, format!("expected a pointer, got {}", other.kind()))
                .into()),
        }
    }

    fn pointer_table(&mut self, index: usize, value: &'a Value) -> RuntimeResult<Slot> {
        let rows = match value {
            Value::Rows(rows) => rows,
            // A prebuilt table
            Value::Buffer(_) | Value::Pointer(_) | Value::Null => return self.pointer(index, value, None),
            other => {
                return Err(self
                    .invalid(index, format!("expected rows for pointer<pointer<T>>, got {}", other.kind()))
                    .into())
            }
        };

        let mut table = Vec::with_capacity(rows.len());
        for (row, entry) in rows.iter().enumerate() {
            let address = match entry {
                Value::Buffer(buf) => self.lease_ptr(buf)? as usize,
                Value::Pointer(ptr) => ptr.address(),
                other => {
                    return Err(FfiError::PointerTableRow {
                        function: self.function.to_string(),
                        index,
                        row,
                        found: other.kind().to_string(),
                    }
                    .into())
                }
            };
            table.push(address);
        }

        let ptr = table.as_mut_ptr() as *mut c_void;
        self.tables.push(table);
        Ok(Slot::Ptr(ptr))
    }
}

/// Convert a raw pointer return
pub(crate) fn pointer_return(ptr: *mut c_void, ty: &NativeType) -> RuntimeResult<Value> {
    if ptr.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        NativeType::CString => {
            // Safety: a cstring return is NUL-terminated per the binding contract
            let s = unsafe { CStr::from_ptr(ptr as *const std::ffi::c_char) };
            Ok(Value::Str(s.to_string_lossy().into_owned()))
        }
        _ => Ok(Value::Pointer(NativePointer::borrowed(ptr as usize)?)),
    }
}
