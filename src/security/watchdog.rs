/*!
 * Memory Watchdog
 * Terminates the helper when its resident set exceeds the call's limit
 */

use crate::core::limits::WATCHDOG_EXIT_CODE;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, warn};

/// Resident set size of this process in bytes
///
/// Reads `VmRSS` from `/proc/self/status`; `None` where that is unavailable.
pub fn resident_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

/// Periodic RSS sampler; stops when dropped
pub struct MemoryWatchdog {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MemoryWatchdog {
    pub fn start(limit_bytes: u64, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("memory-watchdog".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    if let Some(rss) = resident_bytes() {
                        if rss > limit_bytes {
                            error!(rss, limit_bytes, "memory limit exceeded; terminating helper");
                            std::process::exit(WATCHDOG_EXIT_CODE);
                        }
                    }
                    std::thread::park_timeout(interval);
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "could not start memory watchdog");
                None
            }
        };

        Self { stop, handle }
    }
}

impl Drop for MemoryWatchdog {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}
