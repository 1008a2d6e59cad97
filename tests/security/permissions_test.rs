/*!
 * Permission Integration Tests
 * Capability checks enforced by the helper for each call
 */

use crate::common::helper_config;
use relaxnative::{
    BindingDescriptor, Dispatcher, Isolation, NativeModule, Permissions, RuntimeError, SafetyMetadata,
    TrustLevel, Value,
};
use serial_test::serial;

fn module(dispatcher: &Dispatcher, safety: Option<SafetyMetadata>) -> NativeModule {
    dispatcher
        .load_with_safety("/nonexistent/libperm.so", BindingDescriptor::new(), Isolation::Process, safety)
        .unwrap()
}

fn assert_denied(err: &RuntimeError, module_name: &str) {
    assert_eq!(err.name(), "PermissionDeniedError");
    let message = err.to_string();
    assert!(
        message.contains(&format!("Import denied: {module_name} (")),
        "{message}"
    );
}

#[tokio::test]
#[serial]
async fn test_no_metadata_denies_everything() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = module(&dispatcher, None);

    let err = module.call("__probe_fs", vec![Value::from("/tmp")]).await.unwrap_err();
    assert_denied(&err, "fs");
    let err = module.call("__probe_net", vec![]).await.unwrap_err();
    assert_denied(&err, "net");
    let err = module.call("__probe_spawn", vec![]).await.unwrap_err();
    assert_denied(&err, "child_process");

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_community_package_without_grants_is_denied() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = module(&dispatcher, Some(SafetyMetadata::new(TrustLevel::Community)));

    let err = module.call("__probe_fs", vec![Value::from("/tmp")]).await.unwrap_err();
    assert_denied(&err, "fs");

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_fs_read_granted_below_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let inside = root.join("data.bin");
    std::fs::write(&inside, b"x").unwrap();

    let safety = SafetyMetadata::new(TrustLevel::Community)
        .with_permissions(Permissions::default().with_fs_read(&root));
    let dispatcher = Dispatcher::new(helper_config());
    let module = module(&dispatcher, Some(safety));

    let found = module
        .call("__probe_fs", vec![Value::from(inside.to_str().unwrap())])
        .await
        .unwrap();
    assert_eq!(found, Value::I32(1));

    // Escaping the root through `..` is still outside it
    let escape = root.join("..").join("elsewhere");
    let err = module
        .call("__probe_fs", vec![Value::from(escape.to_str().unwrap())])
        .await
        .unwrap_err();
    assert_denied(&err, "fs");

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_spawn_granted() {
    let safety = SafetyMetadata::new(TrustLevel::Verified)
        .with_permissions(Permissions::default().with_spawn());
    let dispatcher = Dispatcher::new(helper_config());
    let module = module(&dispatcher, Some(safety));

    let code = module.call("__probe_spawn", vec![]).await.unwrap();
    assert_eq!(code, Value::I32(0));

    // Other capabilities stay denied
    let err = module.call("__probe_net", vec![]).await.unwrap_err();
    assert_denied(&err, "net");

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_guard_is_per_call() {
    let dispatcher = Dispatcher::new(helper_config());
    let open = module(
        &dispatcher,
        Some(SafetyMetadata::new(TrustLevel::Local).with_permissions(Permissions::default().with_network())),
    );
    let closed = module(&dispatcher, None);

    // Both modules share one helper; grants do not leak between calls
    open.call("__probe_net", vec![Value::from("127.0.0.1:9")]).await.unwrap();
    let err = closed.call("__probe_net", vec![]).await.unwrap_err();
    assert_denied(&err, "net");
    open.call("__probe_net", vec![Value::from("127.0.0.1:9")]).await.unwrap();

    dispatcher.shutdown().await;
}
