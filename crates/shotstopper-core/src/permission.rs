//! Permission gate.
//!
//! No scan starts before [`PermissionGate::request_permissions`] succeeds.
//! On Android the scan/connect grants (API 31+) or coarse location (older)
//! are requested at runtime; other platforms need nothing from us.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::platform::{ANDROID_SPLIT_PERMISSIONS_API, Platform};
use crate::traits::PermissionProvider;

/// A runtime capability needed for Bluetooth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    BluetoothScan,
    BluetoothConnect,
    CoarseLocation,
}

impl Permission {
    /// Permissions `platform` requires before scanning.
    pub fn required_for(platform: Platform) -> Vec<Permission> {
        match platform {
            Platform::Android { api_level } if api_level >= ANDROID_SPLIT_PERMISSIONS_API => {
                vec![Permission::BluetoothScan, Permission::BluetoothConnect]
            }
            Platform::Android { .. } => vec![Permission::CoarseLocation],
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::BluetoothScan => write!(f, "BLUETOOTH_SCAN"),
            Permission::BluetoothConnect => write!(f, "BLUETOOTH_CONNECT"),
            Permission::CoarseLocation => write!(f, "ACCESS_COARSE_LOCATION"),
        }
    }
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Provider for platforms without runtime grants; approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformPermissions;

#[async_trait]
impl PermissionProvider for PlatformPermissions {
    async fn request(&self, permissions: &[Permission]) -> Vec<(Permission, PermissionStatus)> {
        permissions
            .iter()
            .map(|p| (*p, PermissionStatus::Granted))
            .collect()
    }
}

/// Checks platform permissions before any radio operation.
#[derive(Clone)]
pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
    platform: Platform,
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("platform", &self.platform)
            .finish()
    }
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn PermissionProvider>, platform: Platform) -> Self {
        Self { provider, platform }
    }

    /// Request everything the platform needs.
    ///
    /// Succeeds only if every requested permission was granted. A permission
    /// the provider did not answer for counts as denied.
    pub async fn request_permissions(&self) -> Result<()> {
        let required = Permission::required_for(self.platform);
        if required.is_empty() {
            return Ok(());
        }

        debug!(?required, "Requesting Bluetooth permissions");
        let answers = self.provider.request(&required).await;
        let denied: Vec<Permission> = required
            .iter()
            .copied()
            .filter(|p| {
                !answers
                    .iter()
                    .any(|(q, status)| q == p && *status == PermissionStatus::Granted)
            })
            .collect();

        if denied.is_empty() {
            Ok(())
        } else {
            warn!(?denied, "Bluetooth permissions denied");
            Err(Error::PermissionDenied { denied })
        }
    }

    /// Boolean form of [`request_permissions`](Self::request_permissions).
    pub async fn is_granted(&self) -> bool {
        self.request_permissions().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyAll;

    #[async_trait]
    impl PermissionProvider for DenyAll {
        async fn request(
            &self,
            permissions: &[Permission],
        ) -> Vec<(Permission, PermissionStatus)> {
            permissions
                .iter()
                .map(|p| (*p, PermissionStatus::Denied))
                .collect()
        }
    }

    struct Partial;

    #[async_trait]
    impl PermissionProvider for Partial {
        async fn request(&self, _: &[Permission]) -> Vec<(Permission, PermissionStatus)> {
            vec![(Permission::BluetoothScan, PermissionStatus::Granted)]
        }
    }

    #[test]
    fn test_required_permissions_by_api_level() {
        assert_eq!(
            Permission::required_for(Platform::Android { api_level: 33 }),
            vec![Permission::BluetoothScan, Permission::BluetoothConnect]
        );
        assert_eq!(
            Permission::required_for(Platform::Android { api_level: 30 }),
            vec![Permission::CoarseLocation]
        );
        assert!(Permission::required_for(Platform::Ios).is_empty());
        assert!(Permission::required_for(Platform::Linux).is_empty());
    }

    #[tokio::test]
    async fn test_desktop_needs_nothing() {
        let gate = PermissionGate::new(Arc::new(DenyAll), Platform::Linux);
        assert!(gate.request_permissions().await.is_ok());
    }

    #[tokio::test]
    async fn test_android_grants() {
        let gate = PermissionGate::new(
            Arc::new(PlatformPermissions),
            Platform::Android { api_level: 33 },
        );
        assert!(gate.is_granted().await);
    }

    #[tokio::test]
    async fn test_android_denied() {
        let gate = PermissionGate::new(Arc::new(DenyAll), Platform::Android { api_level: 29 });
        match gate.request_permissions().await {
            Err(Error::PermissionDenied { denied }) => {
                assert_eq!(denied, vec![Permission::CoarseLocation]);
            }
            other => panic!("expected PermissionDenied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_answer_counts_as_denied() {
        let gate = PermissionGate::new(Arc::new(Partial), Platform::Android { api_level: 31 });
        match gate.request_permissions().await {
            Err(Error::PermissionDenied { denied }) => {
                assert_eq!(denied, vec![Permission::BluetoothConnect]);
            }
            other => panic!("expected PermissionDenied, got {:?}", other),
        }
    }
}
