/*!
 * Security Types
 * Safety metadata attached to a package and the capabilities it grants
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Security operation result
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Unified security error type
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum SecurityError {
    #[error("Import denied: {capability} ({detail})")]
    #[diagnostic(
        code(security::permission_denied),
        help("Grant the capability in the package permissions to allow it.")
    )]
    PermissionDenied { capability: String, detail: String },
}

impl SecurityError {
    pub fn denied(capability: &Capability) -> Self {
        Self::PermissionDenied {
            capability: capability.module().to_string(),
            detail: capability.to_string(),
        }
    }

    /// Stable kind name
    pub fn name(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "PermissionDeniedError",
        }
    }
}

/// Provenance of a package
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    #[default]
    Local,
    Community,
    Verified,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Community => "community",
            Self::Verified => "verified",
        }
    }
}

/// Filesystem roots a package may read or write below
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsPermissions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPermissions {
    #[serde(default)]
    pub outbound: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessPermissions {
    #[serde(default)]
    pub spawn: bool,
}

/// Requested permissions; everything is denied by default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub fs: FsPermissions,
    #[serde(default)]
    pub network: NetworkPermissions,
    #[serde(default)]
    pub process: ProcessPermissions,
}

impl Permissions {
    pub fn with_fs_read(mut self, root: impl Into<PathBuf>) -> Self {
        self.fs.read.push(root.into());
        self
    }

    pub fn with_fs_write(mut self, root: impl Into<PathBuf>) -> Self {
        self.fs.write.push(root.into());
        self
    }

    pub fn with_network(mut self) -> Self {
        self.network.outbound = true;
        self
    }

    pub fn with_spawn(mut self) -> Self {
        self.process.spawn = true;
        self
    }
}

/// Resource limits enforced by the process executor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

/// Trust level, permissions and limits of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyMetadata {
    #[serde(default)]
    pub trust: TrustLevel,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub limits: Limits,
}

impl SafetyMetadata {
    pub fn new(trust: TrustLevel) -> Self {
        Self {
            trust,
            ..Self::default()
        }
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.limits.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_memory_bytes(mut self, memory_bytes: u64) -> Self {
        self.limits.memory_bytes = Some(memory_bytes);
        self
    }
}

/// A capability exercised inside the helper
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    FsRead(PathBuf),
    FsWrite(PathBuf),
    NetOutbound(String),
    ProcessSpawn(String),
}

impl Capability {
    /// Host module the capability belongs to
    pub fn module(&self) -> &'static str {
        match self {
            Self::FsRead(_) | Self::FsWrite(_) => "fs",
            Self::NetOutbound(_) => "net",
            Self::ProcessSpawn(_) => "child_process",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FsRead(path) => write!(f, "read {}", path.display()),
            Self::FsWrite(path) => write!(f, "write {}", path.display()),
            Self::NetOutbound(target) => write!(f, "connect {}", target),
            Self::ProcessSpawn(program) => write!(f, "spawn {}", program),
        }
    }
}
