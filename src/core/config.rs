/*!
 * Runtime Configuration
 * Defaults, environment overrides and builder-style setters
 */

use super::limits::{
    HELPER_BIN_NAME, HELPER_ENV, HELPER_PING_TIMEOUT, TIMEOUT_MARGIN, WATCHDOG_INTERVAL,
    WORKER_CACHE_CAPACITY,
};
use crate::dispatch::Isolation;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Settings shared by the dispatcher and its channels
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Isolation used by `load` when the caller does not pick one
    pub default_isolation: Isolation,
    /// Explicit helper executable; resolved from the environment when unset
    pub helper_path: Option<PathBuf>,
    pub ping_timeout: Duration,
    /// Secondary timer slack added on top of a call timeout
    pub timeout_margin: Duration,
    pub worker_cache_capacity: usize,
    pub watchdog_interval: Duration,
    /// Verbose per-call events
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_isolation: Isolation::InProcess,
            helper_path: None,
            ping_timeout: HELPER_PING_TIMEOUT,
            timeout_margin: TIMEOUT_MARGIN,
            worker_cache_capacity: WORKER_CACHE_CAPACITY,
            watchdog_interval: WATCHDOG_INTERVAL,
            debug: false,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables
    ///
    /// Environment variables:
    /// - RELAXNATIVE_ISOLATION: in-process | worker | process
    /// - RELAXNATIVE_HELPER: helper executable path
    /// - RELAXNATIVE_DEBUG: 1 | true for verbose call events
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("RELAXNATIVE_ISOLATION") {
            match raw.parse::<Isolation>() {
                Ok(isolation) => config.default_isolation = isolation,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid RELAXNATIVE_ISOLATION"),
            }
        }

        if let Ok(path) = std::env::var(HELPER_ENV) {
            if !path.is_empty() {
                config.helper_path = Some(PathBuf::from(path));
            }
        }

        config.debug = std::env::var("RELAXNATIVE_DEBUG")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);

        config
    }

    pub fn with_default_isolation(mut self, isolation: Isolation) -> Self {
        self.default_isolation = isolation;
        self
    }

    pub fn with_helper_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.helper_path = Some(path.into());
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_timeout_margin(mut self, margin: Duration) -> Self {
        self.timeout_margin = margin;
        self
    }

    pub fn with_worker_cache_capacity(mut self, capacity: usize) -> Self {
        self.worker_cache_capacity = capacity.max(1);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Resolve the helper executable
    ///
    /// Order: explicit path, `RELAXNATIVE_HELPER`, next to the current
    /// executable, then one directory up (test binaries live in `deps/`).
    pub fn resolve_helper(&self) -> Option<PathBuf> {
        if let Some(path) = &self.helper_path {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var(HELPER_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        let exe = std::env::current_exe().ok()?;
        let file_name = format!("{}{}", HELPER_BIN_NAME, std::env::consts::EXE_SUFFIX);
        let dir = exe.parent()?;
        let found = [Some(dir), dir.parent()]
            .into_iter()
            .flatten()
            .map(|d| d.join(&file_name))
            .find(|candidate| candidate.is_file());
        found
    }
}
