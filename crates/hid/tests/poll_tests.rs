//! Integration tests for the device poll loop
//!
//! Tests:
//! - Stop without a running loop
//! - Read rejected while polling, accepted after stop
//! - Terminal error delivery
//! - Callback consumers and dropped streams

use hid_async::test_utils::{
    DEFAULT_TEST_TIMEOUT, FakeDeviceState, FakeDriver, fake_record, with_timeout,
};
use hid_async::{
    DeviceHandle, HidConfig, HidContext, HidError, PollEvent, PollStatus, SubsystemRegistry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Fixture {
    _registry: SubsystemRegistry,
    _ctx: HidContext,
    state: Arc<FakeDeviceState>,
    device: DeviceHandle,
}

async fn fixture() -> Fixture {
    let driver = FakeDriver::new();
    let state = driver.add_device(fake_record("/dev/fake0", 0x1209, 0x0001));
    let registry = SubsystemRegistry::new(driver);

    let mut config = HidConfig::default();
    config.device.poll_interval_ms = 10;
    let ctx = HidContext::with_registry(&registry, &config).unwrap();
    let device = ctx.open_path("/dev/fake0").await.unwrap();

    Fixture {
        _registry: registry,
        _ctx: ctx,
        state,
        device,
    }
}

async fn wait_for_idle(device: &DeviceHandle) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while device.poll_status() != PollStatus::Idle && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() {
    let fx = fixture().await;

    let started = Instant::now();
    with_timeout(DEFAULT_TEST_TIMEOUT, fx.device.stop_polling())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(fx.device.poll_status(), PollStatus::Idle);
    assert_eq!(fx.state.read_calls(), 0);
}

#[tokio::test]
async fn test_read_rejected_until_stop_completes() {
    let fx = fixture().await;
    let _events = fx.device.start_polling().unwrap();
    assert_eq!(fx.device.poll_status(), PollStatus::Running);

    let err = fx.device.read(Some(0)).await.unwrap_err();
    assert_eq!(err, HidError::PollActive);

    fx.device.stop_polling().await;
    assert_eq!(fx.device.poll_status(), PollStatus::Idle);

    fx.state.push_report(vec![0x01, 0x02]);
    assert_eq!(fx.device.read(Some(100)).await.unwrap(), vec![0x01, 0x02]);
}

#[tokio::test]
async fn test_reports_stream_in_order() {
    let fx = fixture().await;
    let events = fx.device.start_polling().unwrap();

    for i in 0..5u8 {
        fx.state.push_report(vec![i, i]);
    }
    for i in 0..5u8 {
        let event = with_timeout(DEFAULT_TEST_TIMEOUT, events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(PollEvent::Report(vec![i, i])));
    }

    fx.device.stop_polling().await;
}

#[tokio::test]
async fn test_writes_allowed_while_polling() {
    let fx = fixture().await;
    let events = fx.device.start_polling().unwrap();

    assert_eq!(fx.device.write(vec![0x00, 0x55]).await.unwrap(), 2);
    let event = with_timeout(DEFAULT_TEST_TIMEOUT, events.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(PollEvent::Report(vec![0x55])));

    fx.device.stop_polling().await;
}

#[tokio::test]
async fn test_second_start_rejected() {
    let fx = fixture().await;
    let _events = fx.device.start_polling().unwrap();

    assert_eq!(
        fx.device.start_polling().unwrap_err(),
        HidError::AlreadyRunning
    );

    fx.device.stop_polling().await;
    let _again = fx.device.start_polling().unwrap();
    fx.device.stop_polling().await;
}

#[tokio::test]
async fn test_start_rejected_while_read_outstanding() {
    let fx = fixture().await;
    let read = fx.device.read(Some(2000));

    assert_eq!(
        fx.device.start_polling().unwrap_err(),
        HidError::PollActive
    );
    assert_eq!(fx.device.poll_status(), PollStatus::Idle);

    fx.state.push_report(vec![0xaa]);
    let report = with_timeout(DEFAULT_TEST_TIMEOUT, read)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report, vec![0xaa]);

    // The finished read no longer blocks the loop
    let events = fx.device.start_polling().unwrap();
    fx.state.push_report(vec![0xbb]);
    let event = with_timeout(DEFAULT_TEST_TIMEOUT, events.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(PollEvent::Report(vec![0xbb])));

    fx.device.stop_polling().await;
}

#[tokio::test]
async fn test_aborted_read_releases_poll_start() {
    let fx = fixture().await;
    fx.state.set_op_delay(Duration::from_millis(50));

    let _blocker = fx.device.write(vec![0x00, 0x01]);
    let queued = fx.device.read(Some(0));
    assert_eq!(
        fx.device.start_polling().unwrap_err(),
        HidError::PollActive
    );

    fx.device.close().await.unwrap();
    assert_eq!(queued.await.unwrap_err(), HidError::DeviceClosed);
    assert_eq!(
        fx.device.start_polling().unwrap_err(),
        HidError::DeviceClosed
    );
}

#[tokio::test]
async fn test_failing_read_delivers_one_error() {
    let fx = fixture().await;
    fx.state.fail_reads(true);
    let events = fx.device.start_polling().unwrap();

    let first = with_timeout(DEFAULT_TEST_TIMEOUT, events.recv())
        .await
        .unwrap();
    assert!(matches!(first, Some(PollEvent::Error(HidError::Read { .. }))));
    assert_eq!(events.recv().await, None);

    wait_for_idle(&fx.device).await;
    assert_eq!(fx.device.poll_status(), PollStatus::Idle);
    assert_eq!(fx.state.read_calls(), 1);

    // Idle again: a one-shot read is accepted and fails on its own
    let err = fx.device.read(Some(0)).await.unwrap_err();
    assert!(matches!(err, HidError::Read { .. }));
}

#[tokio::test]
async fn test_callback_consumer() {
    let fx = fixture().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    fx.device
        .start_polling_with(move |event| {
            let _ = tx.send(event);
        })
        .unwrap();

    fx.state.push_report(vec![0xaa]);
    let event = with_timeout(DEFAULT_TEST_TIMEOUT, rx.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(PollEvent::Report(vec![0xaa])));

    fx.device.stop_polling().await;
    // The forwarding task ends with the loop, dropping the consumer
    let end = with_timeout(DEFAULT_TEST_TIMEOUT, rx.recv()).await.unwrap();
    assert_eq!(end, None);
}

#[tokio::test]
async fn test_dropped_stream_ends_loop() {
    let fx = fixture().await;
    let events = fx.device.start_polling().unwrap();
    drop(events);

    fx.state.push_report(vec![1]);
    wait_for_idle(&fx.device).await;
    assert_eq!(fx.device.poll_status(), PollStatus::Idle);
}

#[tokio::test]
async fn test_close_while_polling() {
    let fx = fixture().await;
    let events = fx.device.start_polling().unwrap();

    fx.device.close().await.unwrap();
    assert_eq!(fx.device.poll_status(), PollStatus::Idle);
    assert_eq!(fx.state.close_count(), 1);
    assert_eq!(events.recv().await, None);
    assert_eq!(
        fx.device.start_polling().unwrap_err(),
        HidError::DeviceClosed
    );
}
