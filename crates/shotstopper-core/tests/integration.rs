//! Integration tests for shotstopper-core.
//!
//! Every test drives a full [`SessionContext`] over [`MockTransport`], the
//! same way a host application would.

use std::sync::Arc;
use std::time::Duration;

use shotstopper_core::{
    AppState, CachePolicy, ConnectOutcome, DeviceSettings, DisconnectReason, Error, ErrorKind,
    MockPeripheral, MockPermissions, MockTransport, PeripheralId, PlatformConfig, RadioState,
    ScaleStatus, SessionConfig, SessionContext, SessionEvent, Setting, SettingValue, SettingsCache,
    Snapshot, StoreCache, Transition,
};
use shotstopper_core::uuids::{SERVICE_LEGACY, SERVICE_PRIMARY};
use tokio::time::timeout;

/// Upper bound for anything the mock does.
const WAIT: Duration = Duration::from_secs(5);

fn config() -> SessionConfig {
    SessionConfig::for_platform(PlatformConfig::linux()).scan_duration(Duration::from_secs(5))
}

async fn start(transport: &Arc<MockTransport>) -> SessionContext {
    SessionContext::builder(transport.clone())
        .config(config())
        .start()
        .await
        .unwrap()
}

async fn connected(peripheral: MockPeripheral) -> (Arc<MockTransport>, SessionContext) {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(peripheral);
    let context = start(&transport).await;
    let outcome = context.handle().connect_and_wait().await.unwrap();
    assert!(matches!(outcome, ConnectOutcome::Connected(_)));
    (transport, context)
}

async fn wait_for(context: &SessionContext, f: impl Fn(&Snapshot) -> bool) -> Snapshot {
    let mut rx = context.subscribe();
    let snapshot = timeout(WAIT, rx.wait_for(|s| f(s)))
        .await
        .expect("state never matched")
        .unwrap();
    *snapshot
}

#[tokio::test]
async fn test_boolean_settings_round_trip_to_peripheral() {
    let (transport, context) = connected(MockPeripheral::new("p")).await;
    let handle = context.handle();

    for setting in [Setting::AutoTare, Setting::Momentary, Setting::ReedSwitch] {
        handle.update(setting, SettingValue::Bool(true)).await.unwrap();
        assert_eq!(transport.value(setting), Some(vec![1]), "{}", setting);
        assert_eq!(handle.read(setting).await.unwrap(), SettingValue::Bool(true));

        handle.update(setting, SettingValue::Bool(false)).await.unwrap();
        assert_eq!(transport.value(setting), Some(vec![0]), "{}", setting);
        assert_eq!(handle.read(setting).await.unwrap(), SettingValue::Bool(false));
    }
}

#[tokio::test]
async fn test_integer_writes_are_clamped() {
    let (transport, context) = connected(MockPeripheral::new("p")).await;
    let handle = context.handle();

    for setting in [
        Setting::WeightValue,
        Setting::MinShotDuration,
        Setting::MaxShotDuration,
        Setting::DripDelay,
    ] {
        handle.update(setting, SettingValue::Int(-5)).await.unwrap();
        assert_eq!(transport.value(setting), Some(vec![0]), "{}", setting);

        handle.update(setting, SettingValue::Int(300)).await.unwrap();
        assert_eq!(transport.value(setting), Some(vec![255]), "{}", setting);
    }
}

#[tokio::test]
async fn test_fractional_values_are_floored() {
    let (transport, context) = connected(MockPeripheral::new("p")).await;

    context
        .handle()
        .update(Setting::WeightValue, SettingValue::from_f64(38.9))
        .await
        .unwrap();
    assert_eq!(transport.value(Setting::WeightValue), Some(vec![38]));
}

#[tokio::test]
async fn test_rapid_connects_run_one_sequence() {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("p"));
    transport.set_connect_latency(Duration::from_millis(50));
    let context = start(&transport).await;
    let handle = context.handle();

    let first = handle.connect().unwrap();
    let second = handle.connect().unwrap();
    first.await.unwrap();
    second.await.unwrap();

    wait_for(&context, |s| s.connection.connected).await;
    assert_eq!(transport.stats().scans_started, 1);
    assert_eq!(transport.stats().connects, 1);
}

#[tokio::test]
async fn test_failed_write_rolls_back_and_disconnects() {
    let (transport, context) = connected(MockPeripheral::new("p")).await;
    let handle = context.handle();
    let mut events = handle.events().unwrap();
    assert_eq!(handle.snapshot().unwrap().settings.drip_delay, 3);

    transport.set_fail_writes(true);
    let err = handle.sync().unwrap().update_drip_delay(7).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteFailed);

    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.settings.drip_delay, 3);
    assert!(!snapshot.connection.connected);
    assert!(!snapshot.is_loading);
    assert!(transport.connected_ids().is_empty());

    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::WriteRolledBack {
            setting: Setting::DripDelay,
            restored: SettingValue::Int(3),
        }
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Disconnected {
            reason: DisconnectReason::WriteFailed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_sweep_is_gated_on_firmware_version() {
    let (transport, context) =
        connected(MockPeripheral::new("p").value(Setting::FirmwareVersion, 0)).await;

    for setting in Setting::EXTENDED {
        assert_eq!(transport.reads_of(setting), 0, "{} was read", setting);
    }
    assert!(transport.subscriptions().is_empty());
    assert_eq!(transport.stats().subscriptions, 0);
    assert!(context.snapshot().connection.connected);

    // An explicit sweep keeps to the same rule.
    context.handle().read_all_settings().await.unwrap();
    for setting in Setting::EXTENDED {
        assert_eq!(transport.reads_of(setting), 0, "{} was read", setting);
    }
}

#[tokio::test]
async fn test_radio_cycle_reconnects_exactly_once() {
    let (transport, context) = connected(MockPeripheral::new("p")).await;

    transport.set_radio_state(RadioState::Off);
    let snapshot = wait_for(&context, |s| {
        s.connection.radio_state == RadioState::Off && !s.connection.connected
    })
    .await;
    assert!(!snapshot.connection.scanning);

    transport.set_radio_state(RadioState::On);
    wait_for(&context, |s| s.connection.connected).await;
    // Give a duplicate attempt the chance to show up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.stats().connects, 2);
    assert_eq!(transport.stats().scans_started, 2);
}

#[tokio::test]
async fn test_radio_on_reconnects_after_earlier_error() {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("p"));
    transport.set_radio_state(RadioState::Off);
    let context = start(&transport).await;

    let err = context.handle().connect_and_wait().await.unwrap_err();
    assert!(matches!(err, Error::RadioOff));
    assert_eq!(
        context.snapshot().connection.last_error,
        Some(ErrorKind::RadioOff)
    );

    transport.set_radio_state(RadioState::On);
    let snapshot = wait_for(&context, |s| s.connection.connected).await;
    assert_eq!(snapshot.connection.last_error, None);
}

#[tokio::test]
async fn test_background_disconnects_before_returning() {
    let (transport, context) = connected(MockPeripheral::new("p")).await;
    let handle = context.handle();

    let transition = handle.app_state_changed(AppState::Background).await.unwrap();
    assert_eq!(transition, Transition::Backgrounded);
    assert!(transport.connected_ids().is_empty());
    let snapshot = handle.snapshot().unwrap();
    assert!(!snapshot.connection.connected);
    assert!(snapshot.connection.scanning);

    // While backgrounded, connect requests are dropped silently.
    assert_eq!(
        handle.connect_and_wait().await.unwrap(),
        ConnectOutcome::NotForeground
    );

    let transition = handle.app_state_changed(AppState::Active).await.unwrap();
    assert_eq!(transition, Transition::Foregrounded);
    wait_for(&context, |s| s.connection.connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_background_during_connect_leaves_nothing_bound() {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("p"));
    transport.set_connect_latency(Duration::from_millis(300));
    let context = start(&transport).await;
    let handle = context.handle();

    let attempt = handle.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let transition = handle.app_state_changed(AppState::Background).await.unwrap();
    assert_eq!(transition, Transition::Backgrounded);
    attempt.await.unwrap();

    let snapshot = handle.snapshot().unwrap();
    assert!(!snapshot.connection.connected);
    assert_eq!(snapshot.connection.last_error, None);
    assert!(transport.connected_ids().is_empty());
    assert_eq!(transport.stats().connects, 0);
}

#[tokio::test(start_paused = true)]
async fn test_radio_off_during_connect_leaves_nothing_bound() {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("p"));
    transport.set_connect_latency(Duration::from_millis(300));
    let context = start(&transport).await;
    let handle = context.handle();

    let attempt = handle.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    transport.set_radio_state(RadioState::Off);
    handle.radio_state_changed(RadioState::Off).await.unwrap();
    attempt.await.unwrap();

    assert!(!handle.snapshot().unwrap().connection.connected);
    assert!(transport.connected_ids().is_empty());
    assert_eq!(transport.stats().connects, 0);
}

#[tokio::test(start_paused = true)]
async fn test_foreground_after_interrupted_connect_runs_one_sequence() {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("p"));
    transport.set_connect_latency(Duration::from_millis(300));
    let context = start(&transport).await;
    let handle = context.handle();

    let attempt = handle.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.app_state_changed(AppState::Background).await.unwrap();
    handle.app_state_changed(AppState::Active).await.unwrap();
    attempt.await.unwrap();
    wait_for(&context, |s| s.connection.connected).await;

    // The interrupted attempt never completed its link.
    assert_eq!(transport.stats().connects, 1);
    assert_eq!(transport.stats().scans_started, 2);
    assert_eq!(transport.connected_ids(), vec![PeripheralId::new("p")]);

    // The latch belongs to nobody once the surviving attempt is done.
    assert!(matches!(
        handle.connect_and_wait().await.unwrap(),
        ConnectOutcome::AlreadyConnected(_)
    ));
}

#[tokio::test]
async fn test_only_matching_peripheral_is_selected() {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("speaker").services(vec![]));
    transport.add_peripheral(MockPeripheral::new("shot").services(vec![SERVICE_PRIMARY]));
    let context = start(&transport).await;
    let mut events = context.events();

    context.handle().connect_and_wait().await.unwrap();
    assert_eq!(transport.connected_ids(), vec![PeripheralId::new("shot")]);
    assert_eq!(transport.stats().connects, 1);

    let mut discovered = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::PeripheralDiscovered { peripheral } = event {
            discovered.push(peripheral.id);
        }
    }
    assert_eq!(discovered, vec![PeripheralId::new("shot")]);
}

#[tokio::test]
async fn test_legacy_layout_is_used_for_legacy_service() {
    let (transport, context) = connected(
        MockPeripheral::new("old")
            .services(vec![SERVICE_LEGACY])
            .value(Setting::WeightValue, 42),
    )
    .await;

    assert_eq!(context.snapshot().settings.weight_value, 42);
    context
        .handle()
        .update(Setting::WeightValue, SettingValue::Int(40))
        .await
        .unwrap();
    assert_eq!(transport.value(Setting::WeightValue), Some(vec![40]));
}

#[tokio::test]
async fn test_permission_denial_never_scans() {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("p"));
    let permissions = Arc::new(MockPermissions::denying());
    let context = SessionContext::builder(transport.clone())
        .config(SessionConfig::for_platform(PlatformConfig::android(30)))
        .permissions(permissions.clone())
        .start()
        .await
        .unwrap();

    let err = context.handle().connect_and_wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(permissions.requests(), 1);
    assert_eq!(transport.stats().scans_started, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_peripheral_reports_device_not_found() {
    let transport = Arc::new(MockTransport::new());
    let context = start(&transport).await;

    let err = context.handle().connect_and_wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    let connection = context.snapshot().connection;
    assert!(!connection.scanning);
    assert_eq!(connection.last_error, Some(ErrorKind::DeviceNotFound));
    assert_eq!(transport.stats().scans_stopped, 1);
}

#[tokio::test]
async fn test_link_drop_does_not_reconnect_by_itself() {
    let (transport, context) = connected(MockPeripheral::new("p")).await;

    transport.simulate_disconnect(&PeripheralId::new("p"));
    wait_for(&context, |s| !s.connection.connected).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.stats().connects, 1);

    let err = context
        .handle()
        .read(Setting::WeightValue)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeviceNotBound));
}

#[tokio::test]
async fn test_scale_status_notifications_merge() {
    let (transport, context) = connected(MockPeripheral::new("p")).await;
    let mut events = context.events();

    transport.notify(&PeripheralId::new("p"), Setting::ScaleStatus, vec![1]);
    let snapshot = wait_for(&context, |s| s.settings.scale_status == ScaleStatus::Connected).await;
    assert!(snapshot.connection.connected);
    assert_eq!(
        timeout(WAIT, events.recv()).await.unwrap().unwrap(),
        SessionEvent::ScaleStatusChanged {
            status: ScaleStatus::Connected
        }
    );
}

#[tokio::test]
async fn test_reset_restores_defaults_everywhere() {
    let (transport, context) = connected(
        MockPeripheral::new("p")
            .value(Setting::WeightValue, 44)
            .value(Setting::AutoTare, 0)
            .value(Setting::MaxShotDuration, 90),
    )
    .await;

    context.handle().reset_to_defaults().await.unwrap();

    let settings = context.snapshot().settings;
    assert_eq!(settings.weight_value, 36);
    assert!(settings.auto_tare);
    assert_eq!(settings.max_shot_duration, 50);
    assert_eq!(transport.value(Setting::AutoTare), Some(vec![1]));
    assert_eq!(transport.write_log().len(), 7);
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("p"));
    let context = SessionContext::builder(transport.clone())
        .config(config())
        .cache(Arc::new(StoreCache::open(&path).unwrap()))
        .start()
        .await
        .unwrap();
    context.handle().connect_and_wait().await.unwrap();
    context
        .handle()
        .update(Setting::MinShotDuration, SettingValue::Int(6))
        .await
        .unwrap();
    context.shutdown().await;

    let context = SessionContext::builder(Arc::new(MockTransport::new()))
        .config(config())
        .cache(Arc::new(StoreCache::open(&path).unwrap()))
        .start()
        .await
        .unwrap();
    let settings = context.snapshot().settings;
    assert_eq!(settings.min_shot_duration, 6);
    assert_eq!(settings.firmware_version, 1);
}

#[tokio::test]
async fn test_boot_only_cache_is_not_written() {
    let cache = Arc::new(shotstopper_core::MemoryCache::with_settings(DeviceSettings {
        drip_delay: 9,
        ..Default::default()
    }));
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("p"));
    let context = SessionContext::builder(transport)
        .config(config().cache_policy(CachePolicy::BootOnly))
        .cache(cache.clone())
        .start()
        .await
        .unwrap();
    assert_eq!(context.snapshot().settings.drip_delay, 9);

    context.handle().connect_and_wait().await.unwrap();
    assert_eq!(context.snapshot().settings.drip_delay, 3);
    assert_eq!(cache.load().unwrap().unwrap().drip_delay, 9);
}

#[tokio::test]
async fn test_connect_emits_lifecycle_events() {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new("p"));
    let context = start(&transport).await;
    let mut events = context.events();

    context.handle().connect_and_wait().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.first(), Some(&SessionEvent::ScanStarted));
    assert!(seen.contains(&SessionEvent::ScanStopped { matched: true }));
    assert!(seen.contains(&SessionEvent::SettingsRead {
        firmware_version: 1,
        extended: true,
    }));
    assert!(matches!(seen.last(), Some(SessionEvent::Connected { .. })));
}
