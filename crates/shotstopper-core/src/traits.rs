//! Seams to the platform.
//!
//! The session never touches a Bluetooth stack, permission API or storage
//! directly. Hosts plug in implementations of these traits; the crate ships
//! [`BtleTransport`](crate::btle::BtleTransport) and
//! [`MockTransport`](crate::mock::MockTransport) for the wireless side.

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use shotstopper_types::DeviceSettings;

use crate::error::Result;
use crate::events::TransportEvent;
use crate::permission::{Permission, PermissionStatus};
use crate::scan::{PeripheralId, PeripheralInfo, ScanFilter};
use crate::state::RadioState;

/// Platform wireless-adapter API.
///
/// All operations address a peripheral by the [`PeripheralId`] reported in
/// its advertisement. Reads, writes and subscriptions name the service and
/// characteristic explicitly so the caller decides the addressing scheme.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Current radio power state.
    async fn radio_state(&self) -> Result<RadioState>;

    /// Peripherals the platform already holds a link to.
    async fn connected_peripherals(&self) -> Result<Vec<PeripheralInfo>>;

    /// Start scanning. Matches arrive as [`TransportEvent::Discovered`].
    async fn start_scan(&self, filter: &ScanFilter) -> Result<()>;

    /// Stop scanning. Stopping an idle adapter is not an error.
    async fn stop_scan(&self) -> Result<()>;

    /// Open a link to `id`.
    async fn connect(&self, id: &PeripheralId) -> Result<()>;

    /// Ask for low-latency connection parameters.
    ///
    /// Platforms without such a request treat this as a no-op.
    async fn request_high_priority(&self, id: &PeripheralId) -> Result<()>;

    /// Resolve services and characteristics; returns the service identifiers found.
    async fn discover_services(&self, id: &PeripheralId) -> Result<Vec<Uuid>>;

    /// Read a characteristic value.
    async fn read(&self, id: &PeripheralId, service: Uuid, characteristic: Uuid)
    -> Result<Vec<u8>>;

    /// Write a characteristic value and wait for the acknowledgement.
    async fn write(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<()>;

    /// Enable notifications; values arrive as [`TransportEvent::Notification`].
    async fn subscribe(&self, id: &PeripheralId, service: Uuid, characteristic: Uuid)
    -> Result<()>;

    /// Close the link to `id`.
    async fn disconnect(&self, id: &PeripheralId) -> Result<()>;

    /// Subscribe to adapter events.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Platform permission API.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Request `permissions`, prompting the user where the platform does.
    async fn request(&self, permissions: &[Permission]) -> Vec<(Permission, PermissionStatus)>;
}

/// Durable storage for the last-known settings.
pub trait SettingsCache: Send + Sync {
    /// Load the saved record, if any.
    fn load(&self) -> Result<Option<DeviceSettings>>;

    /// Replace the saved record.
    fn save(&self, settings: &DeviceSettings) -> Result<()>;
}
