//! Discovery primitives.
//!
//! A scan is filtered by the two accepted service identifiers; the first
//! advertisement carrying either of them wins and the scan stops there.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shotstopper_types::AddressingScheme;
use shotstopper_types::uuid::ACCEPTED_SERVICES;

/// Opaque identifier the platform assigns to a peripheral.
///
/// On macOS this is a CoreBluetooth UUID, elsewhere usually a MAC address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the adapter knows about a peripheral before connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralInfo {
    pub id: PeripheralId,
    /// Advertised local name.
    pub name: Option<String>,
    /// Advertised service identifiers.
    pub services: Vec<Uuid>,
    pub rssi: Option<i16>,
}

impl PeripheralInfo {
    /// Characteristic layout implied by the advertised services.
    pub fn scheme(&self) -> Option<AddressingScheme> {
        AddressingScheme::from_services(&self.services)
    }

    /// Whether this advertisement carries an accepted service identifier.
    pub fn is_candidate(&self) -> bool {
        self.scheme().is_some()
    }
}

/// Scan power/latency trade-off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    LowPower,
    Balanced,
    /// Aggressive scanning for the fastest discovery.
    #[default]
    LowLatency,
}

/// Parameters passed to the adapter when a scan starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Only report peripherals advertising one of these services.
    pub services: Vec<Uuid>,
    pub mode: ScanMode,
    /// Upper bound the session will wait before giving up.
    pub duration: Duration,
}

impl ScanFilter {
    /// Filter on both accepted service identifiers.
    pub fn accepted_services(mode: ScanMode, duration: Duration) -> Self {
        Self {
            services: ACCEPTED_SERVICES.to_vec(),
            mode,
            duration,
        }
    }

    /// Whether `info` passes the service filter.
    pub fn matches(&self, info: &PeripheralInfo) -> bool {
        info.services.iter().any(|s| self.services.contains(s))
    }

    /// Whether a scan should stop at `info` and bind it.
    pub fn selects(&self, info: &PeripheralInfo) -> bool {
        self.matches(info) && info.is_candidate()
    }
}
