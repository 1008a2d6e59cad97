/*!
 * Helper Intrinsics
 * Built-in functions the helper answers when a name is not bound natively
 *
 * They exercise the helper's own capability checks, limits and failure
 * paths without needing a native library.
 */

use crate::core::errors::{RuntimeError, RuntimeResult};
use crate::core::types::Value;
use crate::ffi::FfiError;
use crate::security::watchdog::resident_bytes;
use crate::security::{guard, Capability};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

type Intrinsic = fn(&[Value]) -> RuntimeResult<Value>;

const INTRINSICS: &[(&str, Intrinsic)] = &[
    ("__probe_fs", probe_fs),
    ("__probe_net", probe_net),
    ("__probe_spawn", probe_spawn),
    ("__probe_sleep", probe_sleep),
    ("__probe_crash", probe_crash),
    ("__probe_exit", probe_exit),
    ("__probe_alloc", probe_alloc),
    ("__probe_fill", probe_fill),
    ("__echo", echo),
];

pub fn lookup(name: &str) -> Option<Intrinsic> {
    INTRINSICS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    INTRINSICS.iter().map(|(n, _)| *n)
}

fn invalid(function: &str, index: usize, reason: &str) -> RuntimeError {
    FfiError::InvalidArgument {
        function: function.to_string(),
        index,
        reason: reason.to_string(),
    }
    .into()
}

fn int_arg(args: &[Value], index: usize, function: &str) -> RuntimeResult<i64> {
    args.get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid(function, index, "expected an integer"))
}

/// Stat a path (default: the helper's working directory)
fn probe_fs(args: &[Value]) -> RuntimeResult<Value> {
    let path = match args.first().and_then(Value::as_str) {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().map_err(|e| invalid("__probe_fs", 0, &e.to_string()))?,
    };
    guard::check(&Capability::FsRead(path.clone()))?;
    Ok(Value::I32(i32::from(std::fs::metadata(&path).is_ok())))
}

/// Outbound connection attempt; only the capability check is observable
fn probe_net(args: &[Value]) -> RuntimeResult<Value> {
    let target = args.first().and_then(Value::as_str).unwrap_or("127.0.0.1:9");
    guard::check(&Capability::NetOutbound(target.to_string()))?;
    let reachable = target
        .parse()
        .ok()
        .and_then(|addr| std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(200)).ok())
        .is_some();
    Ok(Value::I32(i32::from(reachable)))
}

fn probe_spawn(_args: &[Value]) -> RuntimeResult<Value> {
    guard::check(&Capability::ProcessSpawn("true".to_string()))?;
    let code = std::process::Command::new("true")
        .status()
        .ok()
        .and_then(|status| status.code())
        .unwrap_or(-1);
    Ok(Value::I32(code))
}

fn probe_sleep(args: &[Value]) -> RuntimeResult<Value> {
    let ms = int_arg(args, 0, "__probe_sleep")?.max(0) as u64;
    std::thread::sleep(Duration::from_millis(ms));
    Ok(Value::I64(ms as i64))
}

/// Die from SIGSEGV, like a faulting native call
fn probe_crash(_args: &[Value]) -> RuntimeResult<Value> {
    use nix::sys::signal::{raise, signal, SigHandler, Signal};

    warn!("crash requested");
    // The std runtime installs a SIGSEGV handler for stack overflows
    unsafe {
        let _ = signal(Signal::SIGSEGV, SigHandler::SigDfl);
    }
    let _ = raise(Signal::SIGSEGV);
    std::process::abort()
}

fn probe_exit(args: &[Value]) -> RuntimeResult<Value> {
    let code = int_arg(args, 0, "__probe_exit")? as i32;
    info!(code, "exit requested");
    std::process::exit(code)
}

/// Touch `bytes` of heap, optionally holding it for `hold_ms`
fn probe_alloc(args: &[Value]) -> RuntimeResult<Value> {
    let bytes = int_arg(args, 0, "__probe_alloc")?.max(0) as usize;
    let hold_ms = args.get(1).and_then(Value::as_i64).unwrap_or(0).max(0) as u64;

    let ballast = vec![0xA5u8; bytes];
    std::thread::sleep(Duration::from_millis(hold_ms));
    let rss = resident_bytes().unwrap_or(0);
    drop(ballast);
    Ok(Value::U64(rss))
}

/// Fill a view or buffer with one byte value
fn probe_fill(args: &[Value]) -> RuntimeResult<Value> {
    let byte = int_arg(args, 1, "__probe_fill")?;
    let byte = u8::try_from(byte).map_err(|_| invalid("__probe_fill", 1, "expected a byte"))?;

    match args.first() {
        Some(Value::View(view)) => {
            let len = view.to_bytes().len();
            view.copy_from_bytes(&vec![byte; len])?;
            Ok(Value::U64(len as u64))
        }
        Some(Value::Buffer(buffer)) => {
            let size = buffer.size()?;
            buffer.write(&vec![byte; size], 0)?;
            Ok(Value::U64(size as u64))
        }
        _ => Err(invalid("__probe_fill", 0, "expected a typed view or buffer")),
    }
}

/// First argument back unchanged, or void
fn echo(args: &[Value]) -> RuntimeResult<Value> {
    Ok(args.first().cloned().unwrap_or(Value::Void))
}
