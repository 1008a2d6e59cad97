/*!
 * Guard Tests
 * Safety metadata parsing and the capability decisions it produces
 */

use relaxnative::security::{guard, Capability, CapabilityGuard};
use relaxnative::{SafetyMetadata, TrustLevel};
use serial_test::serial;

const MANIFEST: &str = r#"{
    "trust": "community",
    "permissions": {
        "fs": {"read": ["/srv/assets"], "write": ["/srv/cache"]},
        "network": {"outbound": false},
        "process": {"spawn": true}
    },
    "limits": {"timeoutMs": 1500, "memoryBytes": 33554432}
}"#;

#[test]
fn test_manifest_grants() {
    let safety: SafetyMetadata = serde_json::from_str(MANIFEST).unwrap();
    assert_eq!(safety.trust, TrustLevel::Community);
    assert_eq!(safety.limits.timeout_ms, Some(1500));
    assert_eq!(safety.limits.memory_bytes, Some(32 * 1024 * 1024));

    let guard = CapabilityGuard::for_safety(Some(&safety));
    assert!(guard.allows(&Capability::FsRead("/srv/assets/logo.png".into())));
    assert!(guard.allows(&Capability::FsRead("/srv/cache/entry".into())));
    assert!(guard.allows(&Capability::FsWrite("/srv/cache/entry".into())));
    assert!(!guard.allows(&Capability::FsWrite("/srv/assets/logo.png".into())));
    assert!(!guard.allows(&Capability::NetOutbound("10.0.0.1:80".into())));
    assert!(guard.allows(&Capability::ProcessSpawn("convert".into())));
}

#[test]
fn test_relative_paths_resolve_against_cwd() {
    let cwd = std::env::current_dir().unwrap();
    let safety: SafetyMetadata =
        serde_json::from_str(r#"{"permissions": {"fs": {"read": ["."]}}}"#).unwrap();
    let guard = CapabilityGuard::for_safety(Some(&safety));

    assert!(guard.allows(&Capability::FsRead(cwd.join("Cargo.toml"))));
    assert!(guard.allows(&Capability::FsRead("src/lib.rs".into())));
    assert!(!guard.allows(&Capability::FsRead("../outside".into())));
}

#[test]
#[serial]
fn test_installed_guard_applies_until_scope_ends() {
    let spawn = Capability::ProcessSpawn("true".into());
    {
        let _scope = guard::install(CapabilityGuard::for_safety(None));
        let err = guard::check(&spawn).unwrap_err();
        assert_eq!(err.name(), "PermissionDeniedError");
        assert_eq!(err.to_string(), "Import denied: child_process (spawn true)");
    }
    assert!(guard::check(&spawn).is_ok());
}
