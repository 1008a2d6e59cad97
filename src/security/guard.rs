/*!
 * Capability Guard
 * Per-call permission checks inside the helper process
 *
 * Native code cannot be intercepted from here; the guard covers every
 * capability the helper itself exercises on behalf of a call. One guard is
 * active per call and the previous one is restored when its scope ends.
 */

use super::types::{Capability, Permissions, SafetyMetadata, SecurityError, SecurityResult};
use parking_lot::{const_rwlock, RwLock};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Lexically normalized absolute form of a path
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    PathBuf::from(path_clean::clean(&absolute))
}

/// Permission checker for one call
#[derive(Debug, Clone, Default)]
pub struct CapabilityGuard {
    read_roots: Vec<PathBuf>,
    write_roots: Vec<PathBuf>,
    outbound: bool,
    spawn: bool,
}

impl CapabilityGuard {
    pub fn new(permissions: &Permissions) -> Self {
        // Write access implies read access below the same root
        let write_roots: Vec<PathBuf> = permissions.fs.write.iter().map(|p| normalize(p)).collect();
        let read_roots = permissions
            .fs
            .read
            .iter()
            .map(|p| normalize(p))
            .chain(write_roots.iter().cloned())
            .collect();
        Self {
            read_roots,
            write_roots,
            outbound: permissions.network.outbound,
            spawn: permissions.process.spawn,
        }
    }

    /// Guard for a call; absent metadata denies everything
    pub fn for_safety(safety: Option<&SafetyMetadata>) -> Self {
        safety
            .map(|s| Self::new(&s.permissions))
            .unwrap_or_default()
    }

    pub fn allows(&self, capability: &Capability) -> bool {
        match capability {
            Capability::FsRead(path) => {
                let path = normalize(path);
                self.read_roots.iter().any(|root| path.starts_with(root))
            }
            Capability::FsWrite(path) => {
                let path = normalize(path);
                self.write_roots.iter().any(|root| path.starts_with(root))
            }
            Capability::NetOutbound(_) => self.outbound,
            Capability::ProcessSpawn(_) => self.spawn,
        }
    }

    pub fn check(&self, capability: &Capability) -> SecurityResult<()> {
        if self.allows(capability) {
            Ok(())
        } else {
            warn!(capability = %capability, "capability denied");
            Err(SecurityError::denied(capability))
        }
    }
}

static ACTIVE: RwLock<Option<CapabilityGuard>> = const_rwlock(None);

/// Restores the previously active guard on drop
pub struct GuardScope {
    previous: Option<CapabilityGuard>,
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        *ACTIVE.write() = self.previous.take();
    }
}

/// Make `guard` the active guard until the returned scope drops
pub fn install(guard: CapabilityGuard) -> GuardScope {
    let previous = ACTIVE.write().replace(guard);
    GuardScope { previous }
}

/// Check against the active guard; with no guard installed nothing is restricted
pub fn check(capability: &Capability) -> SecurityResult<()> {
    match ACTIVE.read().as_ref() {
        Some(guard) => guard.check(capability),
        None => Ok(()),
    }
}
