//! Mock transport for testing.
//!
//! [`MockTransport`] implements [`Transport`] over an in-memory set of
//! peripherals so the session, sync engine and context can be exercised
//! without Bluetooth hardware. It also backs the CLI's demo mode.
//!
//! # Features
//!
//! - **Failure injection**: fail the next N reads, every write, or writes after N successes
//! - **Latency simulation**: fixed connect/read delays and a random write delay range
//! - **Event simulation**: radio toggles, link drops and characteristic notifications

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use shotstopper_types::uuid::SERVICE_PRIMARY;
use shotstopper_types::{AddressingScheme, DeviceSettings, Setting};

use crate::error::{Error, Result};
use crate::events::TransportEvent;
use crate::permission::{Permission, PermissionStatus};
use crate::scan::{PeripheralId, PeripheralInfo, ScanFilter};
use crate::state::RadioState;
use crate::traits::{PermissionProvider, Transport};

/// Identifier of the peripheral [`MockTransport::demo`] simulates.
pub const DEMO_PERIPHERAL_ID: &str = "demo-shotstopper";

/// A simulated peripheral.
///
/// Characteristic values start from [`DeviceSettings::default`] with
/// firmware version 1, so the extended settings are readable.
#[derive(Debug, Clone)]
pub struct MockPeripheral {
    id: PeripheralId,
    name: Option<String>,
    services: Vec<Uuid>,
    exposed_services: Option<Vec<Uuid>>,
    already_connected: bool,
    values: BTreeMap<Setting, Vec<u8>>,
    rssi: Option<i16>,
}

impl MockPeripheral {
    pub fn new(id: impl Into<String>) -> Self {
        let defaults = DeviceSettings {
            firmware_version: 1,
            ..Default::default()
        };
        let values = Setting::ALL
            .into_iter()
            .map(|s| (s, defaults.get(s).encode().to_vec()))
            .collect();
        Self {
            id: PeripheralId::new(id),
            name: Some(shotstopper_types::uuid::DEVICE_NAME.to_string()),
            services: vec![SERVICE_PRIMARY],
            exposed_services: None,
            already_connected: false,
            values,
            rssi: Some(-58),
        }
    }

    #[must_use]
    pub fn name(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_string);
        self
    }

    /// Service identifiers carried in the advertisement.
    #[must_use]
    pub fn services(mut self, services: Vec<Uuid>) -> Self {
        self.services = services;
        self
    }

    /// Service identifiers returned by discovery. Defaults to the advertised set.
    #[must_use]
    pub fn exposed_services(mut self, services: Vec<Uuid>) -> Self {
        self.exposed_services = Some(services);
        self
    }

    /// The platform already holds a link to this peripheral.
    #[must_use]
    pub fn already_connected(mut self) -> Self {
        self.already_connected = true;
        self
    }

    /// Set the raw byte behind `setting`.
    #[must_use]
    pub fn value(mut self, setting: Setting, byte: u8) -> Self {
        self.values.insert(setting, vec![byte]);
        self
    }

    /// Remove the characteristic for `setting`; reading it fails.
    #[must_use]
    pub fn without(mut self, setting: Setting) -> Self {
        self.values.remove(&setting);
        self
    }

    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    fn info(&self) -> PeripheralInfo {
        PeripheralInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            services: self.services.clone(),
            rssi: self.rssi,
        }
    }

    fn discovered_services(&self) -> Vec<Uuid> {
        self.exposed_services
            .clone()
            .unwrap_or_else(|| self.services.clone())
    }
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub scans_started: u32,
    pub scans_stopped: u32,
    pub connects: u32,
    /// Read attempts, including failed ones.
    pub reads: u32,
    /// Acknowledged writes.
    pub writes: u32,
    pub subscriptions: u32,
    pub disconnects: u32,
    pub priority_requests: u32,
}

#[derive(Debug, Default)]
struct Inner {
    peripherals: Vec<MockPeripheral>,
    connected: BTreeSet<PeripheralId>,
    radio_state: RadioState,
    stats: MockStats,
    reads_by_setting: HashMap<Setting, u32>,
    write_log: Vec<(Setting, Vec<u8>)>,
    subscriptions: Vec<Uuid>,
    /// Writes that still succeed before every write fails; `None` never fails.
    writes_before_failure: Option<u32>,
    write_latency_ms: (u64, u64),
}

/// In-memory [`Transport`].
pub struct MockTransport {
    inner: Mutex<Inner>,
    events: broadcast::Sender<TransportEvent>,
    read_failures: AtomicU32,
    connect_failures: AtomicU32,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    /// Delay before advertisements are reported after a scan starts.
    advertise_delay_ms: AtomicU64,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MockTransport")
            .field("peripherals", &inner.peripherals.len())
            .field("connected", &inner.connected)
            .field("radio_state", &inner.radio_state)
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// An empty adapter with the radio on.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner {
                radio_state: RadioState::On,
                ..Default::default()
            }),
            events,
            read_failures: AtomicU32::new(0),
            connect_failures: AtomicU32::new(0),
            read_latency_ms: AtomicU64::new(0),
            connect_latency_ms: AtomicU64::new(0),
            advertise_delay_ms: AtomicU64::new(0),
        }
    }

    /// One shotStopper with realistic latencies: writes take 200-700 ms.
    pub fn demo() -> Self {
        let transport = Self::new();
        transport.add_peripheral(
            MockPeripheral::new(DEMO_PERIPHERAL_ID).value(Setting::FirmwareVersion, 3),
        );
        transport.set_read_latency(Duration::from_millis(40));
        transport.set_connect_latency(Duration::from_millis(300));
        transport.set_advertise_delay(Duration::from_millis(800));
        transport.set_write_latency(Duration::from_millis(200), Duration::from_millis(700));
        transport
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TransportEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub fn add_peripheral(&self, peripheral: MockPeripheral) {
        let mut inner = self.lock();
        if peripheral.already_connected {
            inner.connected.insert(peripheral.id.clone());
        }
        inner.peripherals.retain(|p| p.id != peripheral.id);
        inner.peripherals.push(peripheral);
    }

    /// Switch the radio and report it like a platform would.
    pub fn set_radio_state(&self, state: RadioState) {
        let dropped: Vec<PeripheralId> = {
            let mut inner = self.lock();
            if inner.radio_state == state {
                return;
            }
            inner.radio_state = state;
            if state == RadioState::Off {
                std::mem::take(&mut inner.connected).into_iter().collect()
            } else {
                Vec::new()
            }
        };
        self.emit(TransportEvent::RadioStateChanged(state));
        for id in dropped {
            self.emit(TransportEvent::Disconnected(id));
        }
    }

    /// Drop the link to `id` as if the peripheral went out of range.
    pub fn simulate_disconnect(&self, id: &PeripheralId) {
        if self.lock().connected.remove(id) {
            self.emit(TransportEvent::Disconnected(id.clone()));
        }
    }

    /// Change a characteristic on the peripheral and notify subscribers.
    pub fn notify(&self, id: &PeripheralId, setting: Setting, value: Vec<u8>) {
        let characteristic = {
            let mut inner = self.lock();
            let Some(peripheral) = inner.peripherals.iter_mut().find(|p| &p.id == id) else {
                return;
            };
            peripheral.values.insert(setting, value.clone());
            AddressingScheme::from_services(&peripheral.discovered_services())
                .or_else(|| peripheral.info().scheme())
                .unwrap_or(AddressingScheme::Current)
                .characteristic(setting)
        };
        self.emit(TransportEvent::Notification {
            id: id.clone(),
            characteristic,
            value,
        });
    }

    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_advertise_delay(&self, delay: Duration) {
        self.advertise_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Each write waits a random time in `min..=max`.
    pub fn set_write_latency(&self, min: Duration, max: Duration) {
        let min = min.as_millis() as u64;
        self.lock().write_latency_ms = (min, (max.as_millis() as u64).max(min));
    }

    /// Fail the next `count` reads with a timeout.
    pub fn fail_next_reads(&self, count: u32) {
        self.read_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` connect attempts.
    pub fn fail_next_connects(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Make every write fail, or stop failing.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().writes_before_failure = fail.then_some(0);
    }

    /// Let `count` more writes succeed, then fail every write.
    pub fn fail_writes_after(&self, count: u32) {
        self.lock().writes_before_failure = Some(count);
    }

    pub fn stats(&self) -> MockStats {
        self.lock().stats
    }

    /// Read attempts against `setting`'s characteristic.
    pub fn reads_of(&self, setting: Setting) -> u32 {
        self.lock()
            .reads_by_setting
            .get(&setting)
            .copied()
            .unwrap_or(0)
    }

    /// Acknowledged writes, oldest first.
    pub fn write_log(&self) -> Vec<(Setting, Vec<u8>)> {
        self.lock().write_log.clone()
    }

    /// Characteristics with notifications enabled.
    pub fn subscriptions(&self) -> Vec<Uuid> {
        self.lock().subscriptions.clone()
    }

    pub fn connected_ids(&self) -> Vec<PeripheralId> {
        self.lock().connected.iter().cloned().collect()
    }

    /// Current raw value behind `setting` on the first peripheral.
    pub fn value(&self, setting: Setting) -> Option<Vec<u8>> {
        self.lock()
            .peripherals
            .first()
            .and_then(|p| p.values.get(&setting).cloned())
    }

    fn require_radio(inner: &Inner) -> Result<()> {
        match inner.radio_state {
            RadioState::Off => Err(Error::RadioOff),
            _ => Ok(()),
        }
    }

    fn require_connected(inner: &Inner, id: &PeripheralId) -> Result<()> {
        Self::require_radio(inner)?;
        if inner.connected.contains(id) {
            Ok(())
        } else {
            Err(Error::ConnectionLost)
        }
    }

    fn resolve_setting(
        inner: &Inner,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Setting> {
        let peripheral = inner
            .peripherals
            .iter()
            .find(|p| &p.id == id)
            .ok_or(Error::ConnectionLost)?;
        AddressingScheme::from_service(&service)
            .and_then(|scheme| scheme.setting_for(&characteristic))
            .filter(|s| peripheral.values.contains_key(s))
            .ok_or_else(|| {
                Error::InvalidData(format!("characteristic {} not found", characteristic))
            })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn radio_state(&self) -> Result<RadioState> {
        Ok(self.lock().radio_state)
    }

    async fn connected_peripherals(&self) -> Result<Vec<PeripheralInfo>> {
        let inner = self.lock();
        Self::require_radio(&inner)?;
        Ok(inner
            .peripherals
            .iter()
            .filter(|p| inner.connected.contains(&p.id))
            .map(MockPeripheral::info)
            .collect())
    }

    async fn start_scan(&self, _filter: &ScanFilter) -> Result<()> {
        let advertising: Vec<PeripheralInfo> = {
            let mut inner = self.lock();
            Self::require_radio(&inner)?;
            inner.stats.scans_started += 1;
            inner
                .peripherals
                .iter()
                .filter(|p| !inner.connected.contains(&p.id))
                .map(MockPeripheral::info)
                .collect()
        };
        debug!(count = advertising.len(), "Mock scan started");

        // Like most platforms, advertisements are reported unfiltered.
        let delay = self.advertise_delay_ms.load(Ordering::Relaxed);
        if delay == 0 {
            for info in advertising {
                self.emit(TransportEvent::Discovered(info));
            }
        } else {
            let events = self.events.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                for info in advertising {
                    let _ = events.send(TransportEvent::Discovered(info));
                }
            });
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.lock().stats.scans_stopped += 1;
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let latency = self.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let mut inner = self.lock();
        Self::require_radio(&inner)?;
        inner.stats.connects += 1;
        if self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::connect_failed("injected connect failure"));
        }
        if !inner.peripherals.iter().any(|p| &p.id == id) {
            return Err(Error::connect_failed(format!("unknown peripheral {}", id)));
        }
        inner.connected.insert(id.clone());
        Ok(())
    }

    async fn request_high_priority(&self, id: &PeripheralId) -> Result<()> {
        let mut inner = self.lock();
        Self::require_connected(&inner, id)?;
        inner.stats.priority_requests += 1;
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<Vec<Uuid>> {
        let inner = self.lock();
        Self::require_connected(&inner, id)?;
        Ok(inner
            .peripherals
            .iter()
            .find(|p| &p.id == id)
            .map(MockPeripheral::discovered_services)
            .unwrap_or_default())
    }

    async fn read(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>> {
        let latency = self.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let mut inner = self.lock();
        Self::require_connected(&inner, id)?;
        inner.stats.reads += 1;
        if let Some(setting) = AddressingScheme::from_service(&service)
            .and_then(|scheme| scheme.setting_for(&characteristic))
        {
            *inner.reads_by_setting.entry(setting).or_default() += 1;
        }

        if self
            .read_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::timeout("mock read", Duration::from_millis(latency)));
        }

        let setting = Self::resolve_setting(&inner, id, service, characteristic)?;
        inner
            .peripherals
            .iter()
            .find(|p| &p.id == id)
            .and_then(|p| p.values.get(&setting).cloned())
            .ok_or_else(|| Error::InvalidData(format!("{} has no value", setting)))
    }

    async fn write(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<()> {
        let (min, max) = self.lock().write_latency_ms;
        if max > 0 {
            let millis = rand::rng().random_range(min..=max);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }

        let mut inner = self.lock();
        Self::require_connected(&inner, id)?;
        let setting = Self::resolve_setting(&inner, id, service, characteristic)?;

        match inner.writes_before_failure {
            Some(0) => return Err(Error::ConnectionLost),
            Some(ref mut remaining) => *remaining -= 1,
            None => {}
        }

        if let Some(peripheral) = inner.peripherals.iter_mut().find(|p| &p.id == id) {
            peripheral.values.insert(setting, data.to_vec());
        }
        inner.stats.writes += 1;
        inner.write_log.push((setting, data.to_vec()));
        Ok(())
    }

    async fn subscribe(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<()> {
        let mut inner = self.lock();
        Self::require_connected(&inner, id)?;
        Self::resolve_setting(&inner, id, service, characteristic)?;
        inner.stats.subscriptions += 1;
        if !inner.subscriptions.contains(&characteristic) {
            inner.subscriptions.push(characteristic);
        }
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        let mut inner = self.lock();
        inner.stats.disconnects += 1;
        inner.connected.remove(id);
        inner.subscriptions.clear();
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

/// Permission provider with a fixed answer.
#[derive(Debug)]
pub struct MockPermissions {
    status: PermissionStatus,
    requests: AtomicU32,
}

impl MockPermissions {
    pub fn granting() -> Self {
        Self {
            status: PermissionStatus::Granted,
            requests: AtomicU32::new(0),
        }
    }

    pub fn denying() -> Self {
        Self {
            status: PermissionStatus::Denied,
            requests: AtomicU32::new(0),
        }
    }

    /// How many times permissions were requested.
    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProvider for MockPermissions {
    async fn request(&self, permissions: &[Permission]) -> Vec<(Permission, PermissionStatus)> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        permissions.iter().map(|p| (*p, self.status)).collect()
    }
}
