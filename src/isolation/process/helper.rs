/*!
 * Helper Loop
 * Entry point of the isolated helper process
 *
 * Reads framed requests from stdin and answers on stdout, one call at a
 * time. Logging goes to stderr.
 */

use super::intrinsics;
use super::protocol::{
    collect_copy_back, decode_body, from_wire, read_body_blocking, to_wire, write_frame_blocking, CallRequest,
    FrameIdentity, WireArg, WireRequest, WireResponse,
};
use crate::core::config::RuntimeConfig;
use crate::core::errors::{ErrorPayload, RuntimeError, RuntimeResult};
use crate::core::types::Value;
use crate::ffi::{BindingDescriptor, FfiBinder};
use crate::isolation::cache::BinderCache;
use crate::isolation::thread::panic_message;
use crate::memory::MemoryResult;
use crate::security::{guard, CapabilityGuard, MemoryWatchdog};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Serve requests until the host closes stdin
pub fn run_helper() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env();
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = stdin.lock();
    let mut writer = stdout.lock();

    let mut cache = BinderCache::new(Arc::new(FfiBinder), config.worker_cache_capacity);
    info!(pid = std::process::id(), "helper started");

    while let Some(body) = read_body_blocking(&mut reader)? {
        if let Some(response) = respond(&mut cache, &body, config.watchdog_interval) {
            write_frame_blocking(&mut writer, &response)?;
        }
    }

    info!("host closed the channel; helper exiting");
    Ok(())
}

/// Answer one frame; a body that does not decode fails only its own call
fn respond(cache: &mut BinderCache, body: &[u8], watchdog_interval: Duration) -> Option<WireResponse> {
    match decode_body::<WireRequest>(body) {
        Ok(WireRequest::Ping { id }) => {
            debug!(id, "ping");
            Some(WireResponse::pong(id))
        }
        Ok(WireRequest::Call(call)) => Some(handle_call(cache, call, watchdog_interval)),
        Err(err) => match FrameIdentity::recover(body) {
            Some(FrameIdentity { id, callsite }) => {
                warn!(id, error = %err, "undecodable request");
                Some(WireResponse::failure(id, RuntimeError::from(err).to_payload(callsite)))
            }
            None => {
                warn!(error = %err, bytes = body.len(), "dropping request without an id");
                None
            }
        },
    }
}

fn handle_call(cache: &mut BinderCache, call: CallRequest, watchdog_interval: Duration) -> WireResponse {
    let CallRequest {
        id,
        library_path,
        binding_descriptor,
        safety,
        fn_name,
        args,
        callsite,
    } = call;
    debug!(id, function = %fn_name, library = %library_path, "call");

    let _scope = guard::install(CapabilityGuard::for_safety(safety.as_ref()));
    let _watchdog = safety
        .as_ref()
        .and_then(|s| s.limits.memory_bytes)
        .map(|limit| MemoryWatchdog::start(limit, watchdog_interval));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(cache, &library_path, &binding_descriptor, &fn_name, args)
    }));

    match outcome {
        Ok(Ok((result, args))) => match to_wire(&result) {
            Ok(result) => WireResponse::success(id, result, collect_copy_back(&args)),
            Err(err) => WireResponse::failure(id, RuntimeError::from(err).to_payload(callsite)),
        },
        Ok(Err(err)) => {
            debug!(id, error = %err, "call failed");
            WireResponse::failure(id, err.to_payload(callsite))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(id, function = %fn_name, %message, "native call panicked in helper");
            WireResponse::failure(id, ErrorPayload::new("NativePanicError", message).with_callsite(callsite))
        }
    }
}

fn execute(
    cache: &mut BinderCache,
    library_path: &str,
    descriptor: &BindingDescriptor,
    fn_name: &str,
    args: Vec<WireArg>,
) -> RuntimeResult<(Value, Vec<Value>)> {
    let args = args.into_iter().map(from_wire).collect::<MemoryResult<Vec<_>>>()?;

    let result = match cache.resolve(library_path, descriptor, fn_name)? {
        Some(function) => function.call(&args)?,
        None => match intrinsics::lookup(fn_name) {
            Some(intrinsic) => intrinsic(&args)?,
            None => {
                return Err(RuntimeError::MissingFunction {
                    name: fn_name.to_string(),
                    exports: descriptor.names().map(String::from).collect(),
                })
            }
        },
    };
    Ok((result, args))
}
