//! Published session state.
//!
//! [`StateHub`] holds the single [`Snapshot`] that presentation code reads.
//! Only the session, sync engine and adapter monitor mutate it; every
//! mutator is a no-op when the value would not change, so subscribers are
//! woken only for real changes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use shotstopper_types::{DeviceSettings, Setting, SettingValue};

use crate::error::ErrorKind;

/// Wireless radio power state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    On,
    Off,
    #[default]
    Unknown,
}

impl std::fmt::Display for RadioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadioState::On => write!(f, "on"),
            RadioState::Off => write!(f, "off"),
            RadioState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Link status. Rebuilt for every session and never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub scanning: bool,
    pub radio_state: RadioState,
    pub last_error: Option<ErrorKind>,
}

/// Everything presentation code reads in one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub connection: ConnectionState,
    pub settings: DeviceSettings,
    /// A write or reset is in flight.
    pub is_loading: bool,
}

/// Owner of the published [`Snapshot`].
#[derive(Debug, Clone)]
pub struct StateHub {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl StateHub {
    /// Create a hub seeded with `settings`.
    pub fn new(settings: DeviceSettings) -> Self {
        let (tx, _) = watch::channel(Snapshot {
            settings,
            ..Default::default()
        });
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        *self.tx.borrow()
    }

    /// Receiver that is notified whenever the snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Apply `f` and notify only if the snapshot actually changed.
    fn modify(&self, f: impl FnOnce(&mut Snapshot)) -> bool {
        self.tx.send_if_modified(|snapshot| {
            let before = *snapshot;
            f(snapshot);
            *snapshot != before
        })
    }

    pub(crate) fn set_connected(&self, connected: bool) -> bool {
        self.modify(|s| {
            s.connection.connected = connected;
            if connected {
                s.connection.scanning = false;
                s.connection.last_error = None;
            }
        })
    }

    pub(crate) fn set_scanning(&self, scanning: bool) -> bool {
        self.modify(|s| s.connection.scanning = scanning)
    }

    pub(crate) fn set_radio_state(&self, radio_state: RadioState) -> bool {
        self.modify(|s| s.connection.radio_state = radio_state)
    }

    pub(crate) fn set_error(&self, kind: ErrorKind) -> bool {
        self.modify(|s| s.connection.last_error = Some(kind))
    }

    pub(crate) fn clear_error(&self) -> bool {
        self.modify(|s| s.connection.last_error = None)
    }

    /// Mark the link as down: not connected and not scanning.
    pub(crate) fn set_link_down(&self) -> bool {
        self.modify(|s| {
            s.connection.connected = false;
            s.connection.scanning = false;
        })
    }

    pub(crate) fn set_loading(&self, loading: bool) -> bool {
        self.modify(|s| s.is_loading = loading)
    }

    pub(crate) fn replace_settings(&self, settings: DeviceSettings) -> bool {
        self.modify(|s| s.settings = settings)
    }

    /// Store a single value. Values of the wrong type are dropped.
    pub(crate) fn apply_setting(&self, setting: Setting, value: SettingValue) -> bool {
        self.modify(|s| {
            if let Err(e) = s.settings.set(setting, value) {
                tracing::warn!("Dropping {} update: {}", setting, e);
            }
        })
    }

    pub(crate) fn settings(&self) -> DeviceSettings {
        self.tx.borrow().settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_seeds_settings() {
        let settings = DeviceSettings {
            weight_value: 40,
            ..Default::default()
        };
        let hub = StateHub::new(settings);
        let snapshot = hub.snapshot();
        assert_eq!(snapshot.settings.weight_value, 40);
        assert!(!snapshot.connection.connected);
        assert_eq!(snapshot.connection.radio_state, RadioState::Unknown);
    }

    #[test]
    fn test_redundant_updates_do_not_notify() {
        let hub = StateHub::new(DeviceSettings::default());
        let mut rx = hub.subscribe();

        assert!(!hub.set_scanning(false));
        assert!(!rx.has_changed().unwrap());

        assert!(hub.set_scanning(true));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        assert!(!hub.set_scanning(true));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_connected_clears_scanning_and_error() {
        let hub = StateHub::new(DeviceSettings::default());
        hub.set_scanning(true);
        hub.set_error(ErrorKind::DeviceNotFound);

        hub.set_connected(true);
        let connection = hub.snapshot().connection;
        assert!(connection.connected);
        assert!(!connection.scanning);
        assert_eq!(connection.last_error, None);
    }

    #[test]
    fn test_apply_setting_drops_wrong_type() {
        let hub = StateHub::new(DeviceSettings::default());
        assert!(!hub.apply_setting(Setting::DripDelay, SettingValue::Bool(true)));
        assert!(hub.apply_setting(Setting::DripDelay, SettingValue::Int(6)));
        assert_eq!(hub.settings().drip_delay, 6);
    }
}
