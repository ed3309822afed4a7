//! Bluetooth UUIDs for shotStopper peripherals.
//!
//! The peripheral exposes its parameters under one of two service layouts,
//! depending on firmware generation. Both layouts share the same short
//! characteristic numbers (`0xFF11`..`0xFF19`); they differ in the base UUID
//! the short numbers are expanded into. [`AddressingScheme`] is chosen once,
//! when a peripheral is bound, from the service identifier it advertises.

use uuid::{Uuid, uuid};

use crate::settings::Setting;

/// Advertised local name of the peripheral.
pub const DEVICE_NAME: &str = "shotStopper";

// --- Current layout ---

/// Primary service UUID advertised by current firmware.
pub const SERVICE_PRIMARY: Uuid = uuid!("00000000-0000-0000-0000-000000000ffe");

/// Target brew weight (current layout).
pub const WEIGHT_VALUE: Uuid = uuid!("00000000-0000-0000-0000-00000000ff11");

/// Reed switch brew detection (current layout).
pub const REED_SWITCH: Uuid = uuid!("00000000-0000-0000-0000-00000000ff12");

/// Momentary brew switch (current layout).
pub const MOMENTARY: Uuid = uuid!("00000000-0000-0000-0000-00000000ff13");

/// Auto tare on brew start (current layout).
pub const AUTO_TARE: Uuid = uuid!("00000000-0000-0000-0000-00000000ff14");

/// Minimum shot duration in seconds (current layout).
pub const MIN_SHOT_DURATION: Uuid = uuid!("00000000-0000-0000-0000-00000000ff15");

/// Maximum shot duration in seconds (current layout).
pub const MAX_SHOT_DURATION: Uuid = uuid!("00000000-0000-0000-0000-00000000ff16");

/// Drip delay in seconds (current layout).
pub const DRIP_DELAY: Uuid = uuid!("00000000-0000-0000-0000-00000000ff17");

/// Firmware version, read-only (current layout).
pub const FIRMWARE_VERSION: Uuid = uuid!("00000000-0000-0000-0000-00000000ff18");

/// Scale connection status, read-only with notify (current layout).
pub const SCALE_STATUS: Uuid = uuid!("00000000-0000-0000-0000-00000000ff19");

// --- Legacy layout (16-bit numbers on the Bluetooth SIG base UUID) ---

/// Service UUID advertised by older firmware.
pub const SERVICE_LEGACY: Uuid = uuid!("00000ffe-0000-1000-8000-00805f9b34fb");

/// Target brew weight (legacy layout).
pub const LEGACY_WEIGHT_VALUE: Uuid = uuid!("0000ff11-0000-1000-8000-00805f9b34fb");

/// Reed switch brew detection (legacy layout).
pub const LEGACY_REED_SWITCH: Uuid = uuid!("0000ff12-0000-1000-8000-00805f9b34fb");

/// Momentary brew switch (legacy layout).
pub const LEGACY_MOMENTARY: Uuid = uuid!("0000ff13-0000-1000-8000-00805f9b34fb");

/// Auto tare on brew start (legacy layout).
pub const LEGACY_AUTO_TARE: Uuid = uuid!("0000ff14-0000-1000-8000-00805f9b34fb");

/// Minimum shot duration in seconds (legacy layout).
pub const LEGACY_MIN_SHOT_DURATION: Uuid = uuid!("0000ff15-0000-1000-8000-00805f9b34fb");

/// Maximum shot duration in seconds (legacy layout).
pub const LEGACY_MAX_SHOT_DURATION: Uuid = uuid!("0000ff16-0000-1000-8000-00805f9b34fb");

/// Drip delay in seconds (legacy layout).
pub const LEGACY_DRIP_DELAY: Uuid = uuid!("0000ff17-0000-1000-8000-00805f9b34fb");

/// Firmware version, read-only (legacy layout).
pub const LEGACY_FIRMWARE_VERSION: Uuid = uuid!("0000ff18-0000-1000-8000-00805f9b34fb");

/// Scale connection status, read-only with notify (legacy layout).
pub const LEGACY_SCALE_STATUS: Uuid = uuid!("0000ff19-0000-1000-8000-00805f9b34fb");

/// Both service identifiers accepted during discovery.
pub const ACCEPTED_SERVICES: [Uuid; 2] = [SERVICE_PRIMARY, SERVICE_LEGACY];

/// Characteristic layout of a bound peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressingScheme {
    /// Current firmware layout under [`SERVICE_PRIMARY`].
    Current,
    /// Older firmware layout under [`SERVICE_LEGACY`].
    Legacy,
}

impl AddressingScheme {
    /// Select a scheme from an advertised service identifier.
    ///
    /// Returns `None` for services that are not a shotStopper layout.
    pub fn from_service(service: &Uuid) -> Option<Self> {
        if *service == SERVICE_PRIMARY {
            Some(Self::Current)
        } else if *service == SERVICE_LEGACY {
            Some(Self::Legacy)
        } else {
            None
        }
    }

    /// Select a scheme from a list of advertised services.
    ///
    /// The current layout wins when a peripheral advertises both.
    pub fn from_services<'a>(services: impl IntoIterator<Item = &'a Uuid>) -> Option<Self> {
        let mut found = None;
        for service in services {
            match Self::from_service(service) {
                Some(Self::Current) => return Some(Self::Current),
                Some(Self::Legacy) => found = Some(Self::Legacy),
                None => {}
            }
        }
        found
    }

    /// The service UUID for this layout.
    pub fn service(self) -> Uuid {
        match self {
            Self::Current => SERVICE_PRIMARY,
            Self::Legacy => SERVICE_LEGACY,
        }
    }

    /// The characteristic UUID that holds `setting` in this layout.
    pub fn characteristic(self, setting: Setting) -> Uuid {
        let table = match self {
            Self::Current => &CURRENT_TABLE,
            Self::Legacy => &LEGACY_TABLE,
        };
        table[setting.index()]
    }

    /// Reverse lookup: which setting lives at `characteristic` in this layout.
    pub fn setting_for(self, characteristic: &Uuid) -> Option<Setting> {
        Setting::ALL
            .into_iter()
            .find(|s| self.characteristic(*s) == *characteristic)
    }
}

// Indexed by `Setting::index()`.
const CURRENT_TABLE: [Uuid; Setting::COUNT] = [
    WEIGHT_VALUE,
    REED_SWITCH,
    MOMENTARY,
    AUTO_TARE,
    MIN_SHOT_DURATION,
    MAX_SHOT_DURATION,
    DRIP_DELAY,
    FIRMWARE_VERSION,
    SCALE_STATUS,
];

const LEGACY_TABLE: [Uuid; Setting::COUNT] = [
    LEGACY_WEIGHT_VALUE,
    LEGACY_REED_SWITCH,
    LEGACY_MOMENTARY,
    LEGACY_AUTO_TARE,
    LEGACY_MIN_SHOT_DURATION,
    LEGACY_MAX_SHOT_DURATION,
    LEGACY_DRIP_DELAY,
    LEGACY_FIRMWARE_VERSION,
    LEGACY_SCALE_STATUS,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_uuids() {
        assert_eq!(
            SERVICE_PRIMARY.to_string(),
            "00000000-0000-0000-0000-000000000ffe"
        );
        assert_eq!(
            SERVICE_LEGACY.to_string(),
            "00000ffe-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_scheme_from_service() {
        assert_eq!(
            AddressingScheme::from_service(&SERVICE_PRIMARY),
            Some(AddressingScheme::Current)
        );
        assert_eq!(
            AddressingScheme::from_service(&SERVICE_LEGACY),
            Some(AddressingScheme::Legacy)
        );
        assert_eq!(AddressingScheme::from_service(&Uuid::nil()), None);
    }

    #[test]
    fn test_scheme_prefers_current_layout() {
        let services = [SERVICE_LEGACY, SERVICE_PRIMARY];
        assert_eq!(
            AddressingScheme::from_services(&services),
            Some(AddressingScheme::Current)
        );
        let services = [Uuid::nil(), SERVICE_LEGACY];
        assert_eq!(
            AddressingScheme::from_services(&services),
            Some(AddressingScheme::Legacy)
        );
    }

    #[test]
    fn test_tables_are_distinct_per_scheme() {
        for setting in Setting::ALL {
            assert_ne!(
                AddressingScheme::Current.characteristic(setting),
                AddressingScheme::Legacy.characteristic(setting),
            );
        }
        assert_eq!(
            AddressingScheme::Current.characteristic(Setting::DripDelay),
            DRIP_DELAY
        );
        assert_eq!(
            AddressingScheme::Legacy.characteristic(Setting::ScaleStatus),
            LEGACY_SCALE_STATUS
        );
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(
            AddressingScheme::Current.setting_for(&SCALE_STATUS),
            Some(Setting::ScaleStatus)
        );
        // A current-layout UUID is not part of the legacy table.
        assert_eq!(AddressingScheme::Legacy.setting_for(&SCALE_STATUS), None);
    }
}
