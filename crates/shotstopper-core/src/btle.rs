//! btleplug-backed [`Transport`].

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::events::TransportEvent;
use crate::platform::PlatformConfig;
use crate::scan::{PeripheralId, PeripheralInfo, ScanFilter};
use crate::state::RadioState;
use crate::traits::Transport;
use crate::util::format_peripheral_id;

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

fn peripheral_id(peripheral: &Peripheral) -> PeripheralId {
    PeripheralId::new(format_peripheral_id(&peripheral.id()))
}

fn radio_state(state: CentralState) -> RadioState {
    match state {
        CentralState::PoweredOn => RadioState::On,
        CentralState::PoweredOff => RadioState::Off,
        _ => RadioState::Unknown,
    }
}

/// State shared with the adapter event forwarder.
struct Shared {
    adapter: Adapter,
    peripherals: RwLock<HashMap<PeripheralId, Peripheral>>,
    characteristics: RwLock<HashMap<PeripheralId, Vec<Characteristic>>>,
    notification_tasks: Mutex<HashMap<PeripheralId, JoinHandle<()>>>,
    /// Links we closed ourselves; their disconnect events are not forwarded.
    expected_disconnects: Mutex<HashSet<PeripheralId>>,
    events: broadcast::Sender<TransportEvent>,
}

impl Shared {
    async fn describe(&self, peripheral: &Peripheral) -> Result<PeripheralInfo> {
        let id = peripheral_id(peripheral);
        let properties = peripheral.properties().await?;
        self.peripherals
            .write()
            .await
            .insert(id.clone(), peripheral.clone());
        Ok(PeripheralInfo {
            id,
            name: properties.as_ref().and_then(|p| p.local_name.clone()),
            services: properties
                .as_ref()
                .map(|p| p.services.clone())
                .unwrap_or_default(),
            rssi: properties.and_then(|p| p.rssi),
        })
    }

    fn stop_notifications(&self, id: &PeripheralId) {
        let task = self
            .notification_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if let Some(task) = task {
            task.abort();
        }
    }

    async fn on_disconnected(&self, id: PeripheralId) {
        self.stop_notifications(&id);
        self.characteristics.write().await.remove(&id);
        let expected = self
            .expected_disconnects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        if expected {
            debug!(%id, "Ignoring disconnect we requested");
        } else {
            info!(%id, "Peripheral dropped the link");
            let _ = self.events.send(TransportEvent::Disconnected(id));
        }
    }
}

/// Wireless transport over the first system Bluetooth adapter.
pub struct BtleTransport {
    shared: Arc<Shared>,
    forwarder: JoinHandle<()>,
    operation_timeout: Duration,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl BtleTransport {
    /// Open the first adapter and start forwarding its events.
    pub async fn new() -> Result<Self> {
        Self::with_adapter(get_adapter().await?).await
    }

    pub async fn with_adapter(adapter: Adapter) -> Result<Self> {
        let stream = adapter.events().await?;
        let (events, _) = broadcast::channel(128);
        let shared = Arc::new(Shared {
            adapter,
            peripherals: RwLock::new(HashMap::new()),
            characteristics: RwLock::new(HashMap::new()),
            notification_tasks: Mutex::new(HashMap::new()),
            expected_disconnects: Mutex::new(HashSet::new()),
            events,
        });
        let forwarder = tokio::spawn(forward_central_events(Arc::clone(&shared), stream));

        Ok(Self {
            shared,
            forwarder,
            operation_timeout: PlatformConfig::for_current_platform().recommended_operation_timeout,
        })
    }

    /// Timeout applied to each characteristic read or write.
    #[must_use]
    pub fn operation_timeout(mut self, duration: Duration) -> Self {
        self.operation_timeout = duration;
        self
    }

    async fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral> {
        self.shared
            .peripherals
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| {
                Error::DeviceNotFound(DeviceNotFoundReason::NotFound {
                    identifier: id.to_string(),
                })
            })
    }

    async fn characteristic(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(Peripheral, Characteristic)> {
        let peripheral = self.peripheral(id).await?;
        let found = self
            .shared
            .characteristics
            .read()
            .await
            .get(id)
            .and_then(|chars| {
                chars
                    .iter()
                    .find(|c| c.uuid == characteristic && c.service_uuid == service)
                    .cloned()
            })
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "characteristic {} not found in service {}",
                    characteristic, service
                ))
            })?;
        Ok((peripheral, found))
    }
}

impl Drop for BtleTransport {
    fn drop(&mut self) {
        self.forwarder.abort();
        let tasks = std::mem::take(
            &mut *self
                .shared
                .notification_tasks
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        for task in tasks.into_values() {
            task.abort();
        }
    }
}

async fn forward_central_events(
    shared: Arc<Shared>,
    mut stream: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
) {
    while let Some(event) = stream.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::ServicesAdvertisement { id, .. } => {
                let peripheral = match shared.adapter.peripheral(&id).await {
                    Ok(p) => p,
                    Err(e) => {
                        debug!("Discovered peripheral vanished: {}", e);
                        continue;
                    }
                };
                match shared.describe(&peripheral).await {
                    Ok(info) => {
                        let _ = shared.events.send(TransportEvent::Discovered(info));
                    }
                    Err(e) => debug!("Could not read advertisement: {}", e),
                }
            }
            CentralEvent::DeviceDisconnected(id) => {
                shared
                    .on_disconnected(PeripheralId::new(format_peripheral_id(&id)))
                    .await;
            }
            CentralEvent::StateUpdate(state) => {
                let _ = shared
                    .events
                    .send(TransportEvent::RadioStateChanged(radio_state(state)));
            }
            _ => {}
        }
    }
    debug!("Adapter event stream ended");
}

#[async_trait]
impl Transport for BtleTransport {
    async fn radio_state(&self) -> Result<RadioState> {
        Ok(radio_state(self.shared.adapter.adapter_state().await?))
    }

    async fn connected_peripherals(&self) -> Result<Vec<PeripheralInfo>> {
        let mut connected = Vec::new();
        for peripheral in self.shared.adapter.peripherals().await? {
            if peripheral.is_connected().await.unwrap_or(false) {
                connected.push(self.shared.describe(&peripheral).await?);
            }
        }
        Ok(connected)
    }

    async fn start_scan(&self, filter: &ScanFilter) -> Result<()> {
        // btleplug exposes no scan mode; the platform default is used.
        debug!(mode = ?filter.mode, "Starting BLE scan");
        self.shared
            .adapter
            .start_scan(btleplug::api::ScanFilter {
                services: filter.services.clone(),
            })
            .await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.shared.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self.peripheral(id).await?;
        self.shared
            .expected_disconnects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        Ok(())
    }

    async fn request_high_priority(&self, id: &PeripheralId) -> Result<()> {
        debug!(%id, "Connection priority is not exposed by btleplug; ignoring");
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<Vec<Uuid>> {
        let peripheral = self.peripheral(id).await?;
        peripheral.discover_services().await?;

        let services = peripheral.services();
        let characteristics: Vec<Characteristic> = services
            .iter()
            .flat_map(|s| s.characteristics.iter().cloned())
            .collect();
        debug!(
            services = services.len(),
            characteristics = characteristics.len(),
            "Cached characteristics"
        );
        self.shared
            .characteristics
            .write()
            .await
            .insert(id.clone(), characteristics);
        Ok(services.iter().map(|s| s.uuid).collect())
    }

    async fn read(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>> {
        let (peripheral, c) = self.characteristic(id, service, characteristic).await?;
        timeout(self.operation_timeout, peripheral.read(&c))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("read characteristic {}", characteristic),
                duration: self.operation_timeout,
            })?
            .map_err(Error::from)
    }

    async fn write(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<()> {
        let (peripheral, c) = self.characteristic(id, service, characteristic).await?;
        timeout(
            self.operation_timeout,
            peripheral.write(&c, data, WriteType::WithResponse),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("write characteristic {}", characteristic),
            duration: self.operation_timeout,
        })??;
        Ok(())
    }

    async fn subscribe(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<()> {
        let (peripheral, c) = self.characteristic(id, service, characteristic).await?;
        peripheral.subscribe(&c).await?;

        let running = self
            .shared
            .notification_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id);
        if running {
            return Ok(());
        }

        let mut stream = peripheral.notifications().await?;
        let events = self.shared.events.clone();
        let owner = id.clone();
        let task = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let _ = events.send(TransportEvent::Notification {
                    id: owner.clone(),
                    characteristic: notification.uuid,
                    value: notification.value,
                });
            }
        });
        if let Some(previous) = self
            .shared
            .notification_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), task)
        {
            previous.abort();
        }
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self.peripheral(id).await?;
        self.shared
            .expected_disconnects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone());
        self.shared.stop_notifications(id);
        self.shared.characteristics.write().await.remove(id);
        if let Err(e) = peripheral.disconnect().await {
            warn!(%id, "Disconnect failed: {}", e);
            return Err(e.into());
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_state_mapping() {
        assert_eq!(radio_state(CentralState::PoweredOn), RadioState::On);
        assert_eq!(radio_state(CentralState::PoweredOff), RadioState::Off);
        assert_eq!(radio_state(CentralState::Unknown), RadioState::Unknown);
    }
}
