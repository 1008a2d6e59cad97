/*!
 * FFI Types
 * Type tags, their calling-convention mapping and binder errors
 */

use crate::core::types::ScalarType;
use libffi::middle::Type;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// FFI operation result
pub type FfiResult<T> = Result<T, FfiError>;

/// Binding, loading and argument marshalling errors
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum FfiError {
    #[error("Unsupported native type '{tag}' for {function} {position}")]
    #[diagnostic(
        code(ffi::unsupported_type),
        help("Use a scalar, pointer<scalar>, pointer<pointer<T>>, cstring, buffer or pointer.")
    )]
    UnsupportedType {
        function: String,
        position: String,
        tag: String,
    },

    #[error("Invalid binding descriptor: {0}")]
    #[diagnostic(code(ffi::invalid_descriptor), help("Expected {{name, returns, args[]}} entries."))]
    InvalidDescriptor(String),

    #[error("Library not found: {0}")]
    #[diagnostic(code(ffi::library_not_found))]
    LibraryNotFound(String),

    #[error("Failed to load library '{path}': {reason}")]
    #[diagnostic(code(ffi::load_failed))]
    LoadFailed { path: String, reason: String },

    #[error("Symbol '{symbol}' not found in library '{library}'")]
    #[diagnostic(
        code(ffi::symbol_not_found),
        help("Check that the function is exported with C linkage.")
    )]
    SymbolNotFound { library: String, symbol: String },

    #[error("{function}: expected {expected} arguments, got {got}")]
    #[diagnostic(code(ffi::arity_mismatch))]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("{function}: arg[{index}] {reason}")]
    #[diagnostic(code(ffi::invalid_argument))]
    InvalidArgument {
        function: String,
        index: usize,
        reason: String,
    },

    #[error(
        "{function}: arg[{index}] is pointer<pointer<T>>; row {row} must be a NativeBuffer or NativePointer, got {found}"
    )]
    #[diagnostic(
        code(ffi::pointer_table_row),
        help("Allocate each row with alloc() and pass the handles; typed views have no stable address.")
    )]
    PointerTableRow {
        function: String,
        index: usize,
        row: usize,
        found: String,
    },

    #[error("{function}: arg[{index}] value {value} out of range for {target}")]
    #[diagnostic(code(ffi::out_of_range))]
    OutOfRange {
        function: String,
        index: usize,
        value: String,
        target: String,
    },
}

impl FfiError {
    /// Stable kind name
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnsupportedType { .. } | Self::InvalidDescriptor(_) => "BindError",
            Self::LibraryNotFound(_) | Self::LoadFailed { .. } | Self::SymbolNotFound { .. } => {
                "LoadError"
            }
            Self::ArityMismatch { .. } | Self::InvalidArgument { .. } | Self::PointerTableRow { .. } => {
                "TypeError"
            }
            Self::OutOfRange { .. } => "RangeError",
        }
    }
}

/// Concrete representation of a type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Void,
    Scalar(ScalarType),
    /// NUL-terminated string
    CString,
    /// Pointer keeping its element width
    Pointer(ScalarType),
    /// `pointer<pointer<T>>`, passed as a table of row addresses
    PointerTable,
    /// `buffer`, `void*` or a pointer with an unknown element type
    OpaquePointer,
}

fn generic_inner<'a>(tag: &'a str, head: &str) -> Option<&'a str> {
    let rest = tag.strip_prefix(head)?.trim_start();
    let inner = rest.strip_prefix('<')?.strip_suffix('>')?;
    Some(inner.trim())
}

impl NativeType {
    /// Map a type tag; `None` when the tag is not in the vocabulary
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();

        if let Some(inner) = generic_inner(&tag, "pointer") {
            if generic_inner(inner, "pointer").is_some() {
                return Some(Self::PointerTable);
            }
            return Some(
                ScalarType::parse(inner)
                    .map(Self::Pointer)
                    .unwrap_or(Self::OpaquePointer),
            );
        }

        let native = match tag.as_str() {
            "void" => Self::Void,
            "cstring" | "char*" | "const char*" | "string" => Self::CString,
            // Untyped pointers default to int* so plain integer arrays marshal
            "pointer" => Self::Pointer(ScalarType::I32),
            "buffer" | "void*" => Self::OpaquePointer,
            other => Self::Scalar(ScalarType::parse(other)?),
        };
        Some(native)
    }

    /// Returned as a NativePointer
    pub fn is_pointer_like(&self) -> bool {
        matches!(
            self,
            Self::Pointer(_) | Self::PointerTable | Self::OpaquePointer
        )
    }

    pub fn ffi_type(&self) -> Type {
        match self {
            Self::Void => Type::void(),
            Self::Scalar(scalar) => match scalar {
                ScalarType::I8 => Type::i8(),
                ScalarType::U8 => Type::u8(),
                ScalarType::I16 => Type::i16(),
                ScalarType::U16 => Type::u16(),
                ScalarType::I32 => Type::i32(),
                ScalarType::U32 => Type::u32(),
                ScalarType::I64 => Type::i64(),
                ScalarType::U64 => Type::u64(),
                ScalarType::F32 => Type::f32(),
                ScalarType::F64 => Type::f64(),
            },
            Self::CString | Self::Pointer(_) | Self::PointerTable | Self::OpaquePointer => {
                Type::pointer()
            }
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Scalar(scalar) => f.write_str(scalar.name()),
            Self::CString => f.write_str("cstring"),
            Self::Pointer(scalar) => write!(f, "pointer<{}>", scalar),
            Self::PointerTable => f.write_str("pointer<pointer>"),
            Self::OpaquePointer => f.write_str("buffer"),
        }
    }
}
