//! Session and transport events.
//!
//! [`TransportEvent`]s come up from the wireless adapter. [`SessionEvent`]s
//! go out to anyone who wants a log of what the session did; the published
//! [`Snapshot`](crate::state::Snapshot) remains the source of truth.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use shotstopper_types::{ScaleStatus, Setting, SettingValue};

use crate::error::ErrorKind;
use crate::monitor::AppState;
use crate::scan::{PeripheralId, PeripheralInfo};
use crate::state::RadioState;

/// Events raised by a [`Transport`](crate::traits::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportEvent {
    /// An advertisement was seen while scanning.
    Discovered(PeripheralInfo),
    /// The link to a peripheral dropped.
    Disconnected(PeripheralId),
    /// The radio was switched on or off.
    RadioStateChanged(RadioState),
    /// A subscribed characteristic changed value.
    Notification {
        id: PeripheralId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// Events emitted by the session.
///
/// All events are serializable for logging and IPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    ScanStarted,
    PeripheralDiscovered { peripheral: PeripheralInfo },
    ScanStopped { matched: bool },
    Connected { id: PeripheralId, name: Option<String> },
    Disconnected { id: PeripheralId, reason: DisconnectReason },
    RadioStateChanged { state: RadioState },
    AppStateChanged { state: AppState },
    /// The bulk read finished; `extended` is false for firmware without the extended set.
    SettingsRead { firmware_version: u8, extended: bool },
    SettingWritten { setting: Setting, value: SettingValue },
    WriteRolledBack { setting: Setting, restored: SettingValue },
    ScaleStatusChanged { status: ScaleStatus },
    Error { kind: ErrorKind, message: String },
}

/// Reason for disconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Explicit disconnect request.
    UserRequested,
    /// The app left the foreground.
    Backgrounded,
    /// The radio was turned off.
    RadioOff,
    /// A write failed and the link was torn down.
    WriteFailed,
    /// The peripheral or platform dropped the link.
    LinkLost,
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SessionEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
