/*!
 * Core Types
 * Values crossing the native call boundary and the scalar vocabulary
 */

use crate::memory::{NativeBuffer, NativePointer, TypedArray};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation id for channel requests
pub type CallId = u64;

/// Foreign address
pub type Address = usize;

/// Fixed-width numeric element understood by the calling convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarType {
    /// Width in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::F32 | Self::F64
        )
    }

    /// Canonical tag spelling
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "int8",
            Self::U8 => "uint8",
            Self::I16 => "int16",
            Self::U16 => "uint16",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }

    /// Parse every accepted scalar spelling (C, C99 fixed width, Rust, canonical)
    pub fn parse(tag: &str) -> Option<Self> {
        let scalar = match tag {
            "int8" | "int8_t" | "i8" | "char" | "signed char" => Self::I8,
            "uint8" | "uint8_t" | "u8" | "unsigned char" | "bool" => Self::U8,
            "int16" | "int16_t" | "i16" | "short" => Self::I16,
            "uint16" | "uint16_t" | "u16" | "unsigned short" => Self::U16,
            "int32" | "int32_t" | "i32" | "int" => Self::I32,
            "uint32" | "uint32_t" | "u32" | "uint" | "unsigned int" => Self::U32,
            "int64" | "int64_t" | "i64" | "long" | "long long" | "ssize_t" => Self::I64,
            "uint64" | "uint64_t" | "u64" | "size_t" | "unsigned long" | "usize" => Self::U64,
            "float32" | "f32" | "float" => Self::F32,
            "float64" | "f64" | "double" => Self::F64,
            _ => return None,
        };
        Some(scalar)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value passed to or returned from a native function
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Return of a `void` function
    Void,
    /// Null pointer return
    Null,
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
    Str(String),
    /// Plain numeric array, marshalled into a fresh typed view when passed to `pointer<T>`
    Array(Vec<f64>),
    /// Shared typed view; native writes are visible to the caller after the call
    View(TypedArray),
    Buffer(NativeBuffer),
    Pointer(NativePointer),
    /// Rows of a pointer table argument
    Rows(Vec<Value>),
}

impl Value {
    /// Short runtime type name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Null => "null",
            Self::I8(_)
            | Self::U8(_)
            | Self::I16(_)
            | Self::U16(_)
            | Self::I32(_)
            | Self::U32(_)
            | Self::I64(_)
            | Self::U64(_) => "integer",
            Self::F32(_) | Self::F64(_) => "float",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::View(_) => "typed view",
            Self::Buffer(_) => "NativeBuffer",
            Self::Pointer(_) => "NativePointer",
            Self::Rows(_) => "rows",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::I8(v) => Some(v as f64),
            Self::U8(v) => Some(v as f64),
            Self::I16(v) => Some(v as f64),
            Self::U16(v) => Some(v as f64),
            Self::I32(v) => Some(v as f64),
            Self::U32(v) => Some(v as f64),
            Self::I64(v) => Some(v as f64),
            Self::U64(v) => Some(v as f64),
            Self::F32(v) => Some(v as f64),
            Self::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Integer view of the value; floats qualify only when integral
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Self::I8(v) => Some(v as i128),
            Self::U8(v) => Some(v as i128),
            Self::I16(v) => Some(v as i128),
            Self::U16(v) => Some(v as i128),
            Self::I32(v) => Some(v as i128),
            Self::U32(v) => Some(v as i128),
            Self::I64(v) => Some(v as i128),
            Self::U64(v) => Some(v as i128),
            Self::F32(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i128),
            Self::F64(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i128),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&NativePointer> {
        match self {
            Self::Pointer(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_value_from! {
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
    String => Str,
    Vec<f64> => Array,
    TypedArray => View,
    NativeBuffer => Buffer,
    NativePointer => Pointer,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<&NativeBuffer> for Value {
    fn from(v: &NativeBuffer) -> Self {
        Value::Buffer(v.clone())
    }
}

impl From<&TypedArray> for Value {
    fn from(v: &TypedArray) -> Self {
        Value::View(v.clone())
    }
}
