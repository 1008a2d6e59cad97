/*!
 * Process Isolation Tests
 * Helper lifecycle, crash containment, limits and copy-back
 */

use crate::common::{fixture_descriptor, fixture_lib, helper_config};
use relaxnative::{
    alloc, BindingDescriptor, ChannelState, Dispatcher, IsolationErrorKind, Isolation, NativeModule,
    RuntimeError, SafetyMetadata, TrustLevel, TypedArray, Value,
};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serial_test::serial;
use std::future::IntoFuture;
use std::time::{Duration, Instant};

/// Process module with no native exports; calls reach the helper's probes
fn probe_module(dispatcher: &Dispatcher, safety: Option<SafetyMetadata>) -> NativeModule {
    dispatcher
        .load_with_safety("/nonexistent/libprobe.so", BindingDescriptor::new(), Isolation::Process, safety)
        .unwrap()
}

fn isolation_kind(err: &RuntimeError) -> IsolationErrorKind {
    err.as_isolation()
        .unwrap_or_else(|| panic!("expected an isolation error, got {err:?}"))
        .kind
}

#[tokio::test]
#[serial]
async fn test_helper_started_lazily() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = probe_module(&dispatcher, None);
    assert_eq!(dispatcher.process_state(), ChannelState::Absent);
    assert!(dispatcher.helper_pid().await.is_none());

    let slept = module.call("__probe_sleep", vec![Value::I32(1)]).await.unwrap();
    assert_eq!(slept, Value::I64(1));
    assert_eq!(dispatcher.process_state(), ChannelState::Connected);
    assert!(dispatcher.helper_pid().await.is_some());

    dispatcher.shutdown().await;
    assert_eq!(dispatcher.process_state(), ChannelState::Exited);
}

#[tokio::test]
#[serial]
async fn test_crash_rejects_call_and_respawns() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = probe_module(&dispatcher, None);

    module.call("__probe_sleep", vec![Value::I32(1)]).await.unwrap();
    let first_pid = dispatcher.helper_pid().await.unwrap();

    let err = module.call("__probe_crash", vec![]).await.unwrap_err();
    assert_eq!(err.name(), "ProcessIsolationError");
    let isolation = err.as_isolation().unwrap();
    assert_eq!(isolation.kind, IsolationErrorKind::Crash);
    assert_eq!(isolation.code(), "ISOLATED_PROCESS_CRASH");
    assert_eq!(isolation.signal, Some(11));
    assert!(err.to_string().contains("signal=11"));

    // The next call transparently starts a new helper
    module.call("__probe_sleep", vec![Value::I32(1)]).await.unwrap();
    let second_pid = dispatcher.helper_pid().await.unwrap();
    assert_ne!(first_pid, second_pid);

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_exit_code_is_reported() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = probe_module(&dispatcher, None);

    let err = module.call("__probe_exit", vec![Value::I32(3)]).await.unwrap_err();
    assert_eq!(isolation_kind(&err), IsolationErrorKind::Exit);
    assert_eq!(err.as_isolation().unwrap().exit_code, Some(3));
    assert!(err.to_string().contains("code=3"));

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_timeout_kills_helper() {
    let dispatcher = Dispatcher::new(helper_config());
    let safety = SafetyMetadata::new(TrustLevel::Community).with_timeout_ms(200);
    let module = probe_module(&dispatcher, Some(safety));

    // Warm up so the timing covers only the call
    module.call("__probe_sleep", vec![Value::I32(1)]).await.unwrap();
    let pid = dispatcher.helper_pid().await.unwrap();

    let start = Instant::now();
    let err = module.call("__probe_sleep", vec![Value::I32(3000)]).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.as_isolation().unwrap().is_timeout());
    assert_eq!(err.as_isolation().unwrap().timeout_ms, Some(200));
    assert!(err.to_string().contains("exceeded timeout (200ms)"));
    assert!(elapsed >= Duration::from_millis(190), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");

    module.call("__probe_sleep", vec![Value::I32(1)]).await.unwrap();
    assert_ne!(dispatcher.helper_pid().await.unwrap(), pid);

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_memory_limit_terminates_helper() {
    let dispatcher = Dispatcher::new(helper_config());
    let safety = SafetyMetadata::new(TrustLevel::Community).with_memory_bytes(64 * 1024 * 1024);
    let module = probe_module(&dispatcher, Some(safety));

    let err = module
        .call("__probe_alloc", vec![Value::I64(256 * 1024 * 1024), Value::I32(2000)])
        .await
        .unwrap_err();
    assert_eq!(isolation_kind(&err), IsolationErrorKind::Exit);
    assert_eq!(err.as_isolation().unwrap().exit_code, Some(137));

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_view_and_buffer_copy_back() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = probe_module(&dispatcher, None);

    let view = TypedArray::new(vec![0u32; 4]);
    let written = module
        .call("__probe_fill", vec![Value::View(view.clone()), Value::I32(1)])
        .await
        .unwrap();
    assert_eq!(written, Value::U64(16));
    assert_eq!(view.to_vec::<u32>().unwrap(), vec![0x0101_0101; 4]);

    let buf = alloc(6).unwrap();
    module
        .call("__probe_fill", vec![Value::Buffer(buf.clone()), Value::I32(7)])
        .await
        .unwrap();
    assert_eq!(buf.to_vec().unwrap(), vec![7u8; 6]);
    buf.free().unwrap();

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_concurrent_calls_complete_out_of_order() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = probe_module(&dispatcher, None);

    let slow = module.call("__probe_sleep", vec![Value::I32(50)]).into_future();
    let fast = module.call("__probe_sleep", vec![Value::I32(1)]).into_future();
    let (slow, fast) = tokio::join!(slow, fast);
    assert_eq!(slow.unwrap(), Value::I64(50));
    assert_eq!(fast.unwrap(), Value::I64(1));
    assert_eq!(dispatcher.process_state(), ChannelState::Connected);

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_crash_rejects_every_pending_call() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = probe_module(&dispatcher, None);
    module.call("__probe_sleep", vec![Value::I32(1)]).await.unwrap();
    let pid = dispatcher.helper_pid().await.unwrap();

    let pending: Vec<_> = (0..4)
        .map(|_| tokio::spawn(module.call("__probe_sleep", vec![Value::I32(2000)]).into_future()))
        .collect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    kill(Pid::from_raw(pid as i32), Signal::SIGABRT).unwrap();

    for call in pending {
        let err = call.await.unwrap().unwrap_err();
        assert_eq!(isolation_kind(&err), IsolationErrorKind::Crash);
        assert_eq!(err.as_isolation().unwrap().signal, Some(6));
    }

    // A call after the crash runs on a fresh helper
    assert_eq!(module.call("__probe_sleep", vec![Value::I32(5)]).await.unwrap(), Value::I64(5));
    assert_ne!(dispatcher.helper_pid().await.unwrap(), pid);

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_call_racing_a_crash_reports_the_crash() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = probe_module(&dispatcher, None);

    for _ in 0..8 {
        module.call("__probe_sleep", vec![Value::I32(1)]).await.unwrap();
        let crash = module.call("__probe_crash", vec![]).into_future();
        let sleep = module.call("__probe_sleep", vec![Value::I32(5)]).into_future();
        let (crash, sleep) = tokio::join!(crash, sleep);

        assert_eq!(isolation_kind(&crash.unwrap_err()), IsolationErrorKind::Crash);
        if let Err(err) = sleep {
            assert_eq!(isolation_kind(&err), IsolationErrorKind::Crash, "{err}");
        }
    }

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_non_finite_floats_round_trip() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = probe_module(&dispatcher, None);
    module.call("__echo", vec![Value::I32(0)]).await.unwrap();
    let pid = dispatcher.helper_pid().await.unwrap();

    match module.call("__echo", vec![Value::F64(f64::NAN)]).await.unwrap() {
        Value::F64(v) => assert!(v.is_nan()),
        other => panic!("expected f64, got {other:?}"),
    }
    for value in [f64::INFINITY, f64::NEG_INFINITY] {
        assert_eq!(module.call("__echo", vec![Value::F64(value)]).await.unwrap(), Value::F64(value));
    }
    assert_eq!(
        module.call("__echo", vec![Value::F32(f32::INFINITY)]).await.unwrap(),
        Value::F32(f32::INFINITY)
    );
    match module.call("__echo", vec![Value::Array(vec![1.5, f64::NAN, f64::NEG_INFINITY])]).await.unwrap() {
        Value::Array(values) => {
            assert_eq!(values[0], 1.5);
            assert!(values[1].is_nan());
            assert_eq!(values[2], f64::NEG_INFINITY);
        }
        other => panic!("expected array, got {other:?}"),
    }

    // A NaN argument to an integer intrinsic is an argument error, not a dead helper
    let err = module.call("__probe_sleep", vec![Value::F64(f64::NAN)]).await.unwrap_err();
    assert_eq!(err.name(), "TypeError");
    assert_eq!(dispatcher.helper_pid().await, Some(pid));

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_fixture_calls_in_helper() {
    let Some(lib) = fixture_lib() else { return };
    let dispatcher = Dispatcher::new(helper_config());
    let module = dispatcher.load(lib, fixture_descriptor(), Isolation::Process).unwrap();
    assert!(!module.is_direct("add"));

    assert_eq!(module.call("add", vec![Value::I32(4), Value::I32(5)]).await.unwrap(), Value::I32(9));
    assert_eq!(
        module.call("greet", vec![]).await.unwrap(),
        Value::Str("hello from native".into())
    );

    let view = TypedArray::new(vec![1.0f64, 3.0]);
    module
        .call("scale_in_place", vec![Value::View(view.clone()), Value::I32(2), Value::F64(2.0)])
        .await
        .unwrap();
    assert_eq!(view.to_vec::<f64>().unwrap(), vec![2.0, 6.0]);

    let err = module.call("crash_segv", vec![]).await.unwrap_err();
    assert_eq!(isolation_kind(&err), IsolationErrorKind::Crash);

    // Host process is untouched and the helper comes back
    assert_eq!(module.call("add", vec![Value::I32(1), Value::I32(1)]).await.unwrap(), Value::I32(2));

    dispatcher.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_remote_errors_carry_callsite() {
    let dispatcher = Dispatcher::new(helper_config());
    let module = probe_module(&dispatcher, None);

    let err = module.call("not_declared_anywhere", vec![]).await.unwrap_err();
    assert_eq!(err.name(), "MissingFunctionError");
    match &err {
        RuntimeError::Remote(remote) => {
            let callsite = remote.payload().callsite.as_deref().unwrap();
            assert!(callsite.contains("process_test.rs"), "{callsite}");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }

    dispatcher.shutdown().await;
}
