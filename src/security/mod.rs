/*!
 * Security
 * Safety metadata, capability guard and resource watchdog for the helper
 */

pub mod guard;
pub mod types;
pub mod watchdog;

pub use guard::{CapabilityGuard, GuardScope};
pub use types::{
    Capability, FsPermissions, Limits, NetworkPermissions, Permissions, ProcessPermissions,
    SafetyMetadata, SecurityError, SecurityResult, TrustLevel,
};
pub use watchdog::MemoryWatchdog;
