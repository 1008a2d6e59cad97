/*!
 * Native Call Binder
 * Library + descriptor to one safe callable per function
 */

use super::descriptor::{BindingDescriptor, Signature};
use super::library::shared_loader;
use super::marshal::{pointer_return, MarshalContext};
use super::traits::{LibraryBinder, NativeFunction, RawCallables};
use super::types::{FfiError, NativeType};
use crate::core::errors::RuntimeResult;
use crate::core::types::{ScalarType, Value};
use libffi::middle::{Cif, CodePtr};
use libloading::Library;
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A resolved native symbol with its signature
pub struct BoundFunction {
    name: String,
    signature: Signature,
    /// Call interface built once from the signature
    cif: Cif,
    code: *mut c_void,
    /// Keeps the symbol mapped
    _library: Arc<Library>,
}

// Safety: the code pointer and cif are never mutated after binding; libffi only
// reads the cif during a call. The library outlives both via the Arc
unsafe impl Send for BoundFunction {}
unsafe impl Sync for BoundFunction {}

impl BoundFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Marshal, call and convert the result
    pub fn invoke(&self, args: &[Value]) -> RuntimeResult<Value> {
        let mut ctx = MarshalContext::new(&self.name);
        let slots = ctx.marshal_all(args, &self.signature.args)?;
        let ffi_args: Vec<_> = slots.iter().map(|slot| slot.arg()).collect();

        let cif = &self.cif;
        let code = CodePtr(self.code);

        // Safety: the cif matches the declared signature and every pointer
        // argument stays valid until ctx drops below
        let result = unsafe {
            match self.signature.returns {
                NativeType::Void => {
                    cif.call::<()>(code, &ffi_args);
                    Value::Void
                }
                // Integer returns narrower than a register are widened by libffi
                NativeType::Scalar(scalar) => match scalar {
                    ScalarType::I8 => Value::I8(cif.call::<i64>(code, &ffi_args) as i8),
                    ScalarType::U8 => Value::U8(cif.call::<u64>(code, &ffi_args) as u8),
                    ScalarType::I16 => Value::I16(cif.call::<i64>(code, &ffi_args) as i16),
                    ScalarType::U16 => Value::U16(cif.call::<u64>(code, &ffi_args) as u16),
                    ScalarType::I32 => Value::I32(cif.call::<i64>(code, &ffi_args) as i32),
                    ScalarType::U32 => Value::U32(cif.call::<u64>(code, &ffi_args) as u32),
                    ScalarType::I64 => Value::I64(cif.call::<i64>(code, &ffi_args)),
                    ScalarType::U64 => Value::U64(cif.call::<u64>(code, &ffi_args)),
                    ScalarType::F32 => Value::F32(cif.call::<f32>(code, &ffi_args)),
                    ScalarType::F64 => Value::F64(cif.call::<f64>(code, &ffi_args)),
                },
                ref pointer_like => {
                    let raw = cif.call::<*mut c_void>(code, &ffi_args);
                    pointer_return(raw, pointer_like)?
                }
            }
        };

        drop(ffi_args);
        drop(ctx);
        Ok(result)
    }
}

impl NativeFunction for BoundFunction {
    fn call(&self, args: &[Value]) -> RuntimeResult<Value> {
        self.invoke(args)
    }
}

impl fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Bind every descriptor entry against an already loaded library
///
/// Signatures are validated before any symbol is resolved.
pub fn bind_library(
    library: Arc<Library>,
    library_name: &str,
    descriptor: &BindingDescriptor,
) -> Result<Vec<BoundFunction>, FfiError> {
    let signatures = descriptor.resolve_all()?;

    signatures
        .into_iter()
        .map(|(name, signature)| {
            // Safety: the symbol is only called through a cif built from its signature
            let code = unsafe {
                library
                    .get::<unsafe extern "C" fn()>(name.as_bytes())
                    .map(|symbol| *symbol as *mut c_void)
            }
            .map_err(|_| FfiError::SymbolNotFound {
                library: library_name.to_string(),
                symbol: name.clone(),
            })?;

            let cif = Cif::new(
                signature.args.iter().map(NativeType::ffi_type),
                signature.returns.ffi_type(),
            );

            debug!(function = %name, library = library_name, "bound native function");
            Ok(BoundFunction {
                name,
                signature,
                cif,
                code,
                _library: Arc::clone(&library),
            })
        })
        .collect()
}

/// Load `library_path` through the shared loader and bind `descriptor`
pub fn bind_functions(library_path: &str, descriptor: &BindingDescriptor) -> RuntimeResult<RawCallables> {
    // Reject bad descriptors before touching the library
    descriptor.resolve_all()?;
    let library = shared_loader().lock().load(library_path)?;
    let bound = bind_library(library, library_path, descriptor)?;
    Ok(bound
        .into_iter()
        .map(|f| (f.name.clone(), Arc::new(f) as Arc<dyn NativeFunction>))
        .collect())
}

/// Binder backed by the dynamic loader
#[derive(Debug, Default, Clone, Copy)]
pub struct FfiBinder;

impl LibraryBinder for FfiBinder {
    fn bind(&self, library_path: &str, descriptor: &BindingDescriptor) -> RuntimeResult<RawCallables> {
        bind_functions(library_path, descriptor)
    }
}
