/*!
 * Runtime Limits and Constants
 *
 * Centralized location for timeouts, capacities and thresholds used by the
 * dispatcher, the isolation channels and the helper process.
 */

use std::time::Duration;

// =============================================================================
// MEMORY
// =============================================================================

/// Alignment of every NativeBuffer allocation
/// Large enough for any scalar element type and common SIMD loads
pub const BUFFER_ALIGNMENT: usize = 16;

// =============================================================================
// ISOLATION CHANNELS
// =============================================================================

/// Grace period after a call timeout before the secondary timer rejects
pub const TIMEOUT_MARGIN: Duration = Duration::from_millis(25);

/// Upper bound for the helper handshake (ping round trip)
pub const HELPER_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on loaded libraries cached by the thread worker
pub const WORKER_CACHE_CAPACITY: usize = 32;

/// Largest IPC frame accepted from either side (64MB)
/// [SECURITY] Guards against a corrupted length prefix allocating unbounded memory
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

// =============================================================================
// HELPER PROCESS
// =============================================================================

/// Memory watchdog sampling period
pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(50);

/// Exit code used when the watchdog terminates the helper (128 + SIGKILL)
/// [LINUX-COMPAT]
pub const WATCHDOG_EXIT_CODE: i32 = 137;

/// Environment variable naming the helper executable
pub const HELPER_ENV: &str = "RELAXNATIVE_HELPER";

/// File name of the helper executable
pub const HELPER_BIN_NAME: &str = "relaxnative-helper";
