/*!
 * Worker Isolation Tests
 * Fixture calls routed through the dedicated worker thread
 */

use crate::common::{fixture_descriptor, fixture_lib};
use relaxnative::{
    alloc, CallMode, ChannelState, Dispatcher, Isolation, NativeModule, RuntimeConfig, TypedArray,
    Value,
};
use std::time::{Duration, Instant};

fn load(dispatcher: &Dispatcher, lib: &str) -> NativeModule {
    let mut descriptor = fixture_descriptor();
    descriptor.set_mode("scale_in_place", CallMode::Async).unwrap();
    descriptor.set_mode("sleep_ms", CallMode::Async).unwrap();
    descriptor.set_mode("fill_u8", CallMode::Async).unwrap();
    dispatcher.load(lib, descriptor, Isolation::Thread).unwrap()
}

#[tokio::test]
async fn test_sync_exports_run_on_caller() {
    let Some(lib) = fixture_lib() else { return };
    let dispatcher = Dispatcher::new(RuntimeConfig::default());
    let module = load(&dispatcher, lib);

    assert!(module.is_direct("add"));
    let invocation = module.call("add", vec![Value::I32(20), Value::I32(22)]);
    assert!(invocation.is_pending());
    assert_eq!(invocation.await.unwrap(), Value::I32(42));
    assert_eq!(dispatcher.thread_state(), ChannelState::Absent);
}

#[tokio::test]
async fn test_async_exports_share_views_with_worker() {
    let Some(lib) = fixture_lib() else { return };
    let dispatcher = Dispatcher::new(RuntimeConfig::default());
    let module = load(&dispatcher, lib);

    assert!(!module.is_direct("scale_in_place"));
    let view = TypedArray::new(vec![2.0f64, 4.0]);
    let result = module
        .call("scale_in_place", vec![Value::View(view.clone()), Value::I32(2), Value::F64(1.5)])
        .await
        .unwrap();

    assert_eq!(result, Value::Void);
    assert_eq!(view.to_vec::<f64>().unwrap(), vec![3.0, 6.0]);
    assert_eq!(dispatcher.thread_state(), ChannelState::Connected);
}

#[tokio::test]
async fn test_worker_writes_to_caller_buffer() {
    let Some(lib) = fixture_lib() else { return };
    let dispatcher = Dispatcher::new(RuntimeConfig::default());
    let module = load(&dispatcher, lib);

    let buf = alloc(8).unwrap();
    module
        .call("fill_u8", vec![Value::Buffer(buf.clone()), Value::I32(8), Value::U8(9)])
        .await
        .unwrap();
    assert_eq!(buf.to_vec().unwrap(), vec![9u8; 8]);

    // The same buffer is then read directly on the caller thread
    let sum = module.call("sum_u8", vec![Value::Buffer(buf.clone()), Value::I32(8)]).await.unwrap();
    assert_eq!(sum, Value::U32(72));
    buf.free().unwrap();
}

#[tokio::test]
async fn test_worker_calls_do_not_block_caller() {
    let Some(lib) = fixture_lib() else { return };
    let dispatcher = Dispatcher::new(RuntimeConfig::default());
    let module = load(&dispatcher, lib);

    let start = Instant::now();
    let pending = module.call("sleep_ms", vec![Value::I32(200)]);
    assert!(start.elapsed() < Duration::from_millis(150));

    pending.await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_worker_errors_keep_callsite() {
    let Some(lib) = fixture_lib() else { return };
    let dispatcher = Dispatcher::new(RuntimeConfig::default());
    let module = load(&dispatcher, lib);

    let err = module
        .call("scale_in_place", vec![Value::I32(1), Value::I32(1), Value::F64(1.0)])
        .await
        .unwrap_err();
    assert_eq!(err.name(), "TypeError");

    let remote = match &err {
        relaxnative::RuntimeError::Remote(remote) => remote,
        other => panic!("expected a remote error, got {other:?}"),
    };
    let callsite = remote.payload().callsite.as_deref().unwrap();
    assert!(callsite.contains("worker_test.rs"), "{callsite}");
}

#[tokio::test]
async fn test_worker_survives_shutdown() {
    let Some(lib) = fixture_lib() else { return };
    let dispatcher = Dispatcher::new(RuntimeConfig::default());
    let module = load(&dispatcher, lib);

    module.call("sleep_ms", vec![Value::I32(1)]).await.unwrap();
    dispatcher.shutdown().await;
    assert_eq!(dispatcher.thread_state(), ChannelState::Exited);

    // A fresh worker is started on demand
    module.call("sleep_ms", vec![Value::I32(1)]).await.unwrap();
    assert_eq!(dispatcher.thread_state(), ChannelState::Connected);
}
