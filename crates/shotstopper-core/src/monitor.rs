//! Adapter state monitor.
//!
//! Turns radio power changes and app lifecycle transitions into connect and
//! disconnect decisions. Repeated identical notifications are ignored.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::events::{DisconnectReason, EventDispatcher, SessionEvent};
use crate::session::{Session, SessionListener};
use crate::state::{RadioState, StateHub};

/// Application lifecycle state as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    #[default]
    Active,
    Inactive,
    Background,
}

impl AppState {
    pub fn is_foreground(self) -> bool {
        self == AppState::Active
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppState::Active => write!(f, "active"),
            AppState::Inactive => write!(f, "inactive"),
            AppState::Background => write!(f, "background"),
        }
    }
}

/// What a state notification caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same state as before, or nothing to do.
    Ignored,
    /// The radio went off and the link was torn down.
    Disconnected,
    /// A background connect attempt was started.
    ReconnectScheduled,
    /// The app left the foreground; the link was released before returning.
    Backgrounded,
    /// The app came back; the latch was cleared and a connect started.
    Foregrounded,
}

/// Reacts to radio and lifecycle changes on behalf of a [`Session`].
pub struct AdapterMonitor {
    session: Arc<Session>,
    listener: Arc<dyn SessionListener>,
    state: StateHub,
    events: EventDispatcher,
    radio: Mutex<RadioState>,
    app: Mutex<AppState>,
}

impl std::fmt::Debug for AdapterMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterMonitor")
            .field("radio", &self.radio_state())
            .field("app", &self.app_state())
            .finish_non_exhaustive()
    }
}

impl AdapterMonitor {
    pub fn new(
        session: Arc<Session>,
        listener: Arc<dyn SessionListener>,
        state: StateHub,
        events: EventDispatcher,
    ) -> Self {
        Self {
            session,
            listener,
            state,
            events,
            radio: Mutex::new(RadioState::Unknown),
            app: Mutex::new(AppState::Active),
        }
    }

    /// Last radio state observed.
    pub fn radio_state(&self) -> RadioState {
        *self.radio.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Last app state observed.
    pub fn app_state(&self) -> AppState {
        *self.app.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the radio state seen at startup without acting on it.
    pub(crate) fn prime_radio_state(&self, radio: RadioState) {
        *self.radio.lock().unwrap_or_else(|e| e.into_inner()) = radio;
        self.state.set_radio_state(radio);
    }

    /// Record `next` and return the previous value, or `None` if unchanged.
    fn swap<T: Copy + PartialEq>(slot: &Mutex<T>, next: T) -> Option<T> {
        let mut current = slot.lock().unwrap_or_else(|e| e.into_inner());
        if *current == next {
            return None;
        }
        Some(std::mem::replace(&mut *current, next))
    }

    /// Handle a radio power change.
    ///
    /// Off cancels any in-flight connect and tears the link down. On starts a reconnect whatever the last
    /// error was.
    pub async fn on_radio_state(&self, radio: RadioState) -> Transition {
        let Some(previous) = Self::swap(&self.radio, radio) else {
            debug!(%radio, "Radio state unchanged");
            return Transition::Ignored;
        };
        info!(%previous, %radio, "Radio state changed");
        self.state.set_radio_state(radio);
        self.events
            .send(SessionEvent::RadioStateChanged { state: radio });

        match radio {
            RadioState::Off => {
                self.session.cancel_attempt();
                if let Err(e) = self
                    .session
                    .disconnect_with(DisconnectReason::RadioOff)
                    .await
                {
                    debug!("Disconnect after radio off failed: {}", e);
                }
                self.state.set_link_down();
                Transition::Disconnected
            }
            RadioState::On => {
                self.session.spawn_connect(Arc::clone(&self.listener));
                Transition::ReconnectScheduled
            }
            RadioState::Unknown => Transition::Ignored,
        }
    }

    /// Handle an app lifecycle change.
    ///
    /// Leaving the foreground cancels any in-flight connect, disconnects
    /// before returning and sets
    /// `scanning` so the next foreground transition knows to retry.
    /// Returning to the foreground retires the previous attempt, clears the
    /// connect latch and reconnects.
    pub async fn on_app_state(&self, app: AppState) -> Transition {
        let Some(previous) = Self::swap(&self.app, app) else {
            debug!(%app, "App state unchanged");
            return Transition::Ignored;
        };
        self.events.send(SessionEvent::AppStateChanged { state: app });

        if previous.is_foreground() == app.is_foreground() {
            debug!(%previous, %app, "Foreground status unchanged");
            return Transition::Ignored;
        }
        info!(%previous, %app, "App state changed");

        if app.is_foreground() {
            self.session.set_foreground(true);
            self.session.reset_latch();
            self.session.spawn_connect(Arc::clone(&self.listener));
            Transition::Foregrounded
        } else {
            self.session.set_foreground(false);
            self.session.cancel_attempt();
            if let Err(e) = self
                .session
                .disconnect_with(DisconnectReason::Backgrounded)
                .await
            {
                debug!("Disconnect on background failed: {}", e);
            }
            self.state.set_scanning(true);
            Transition::Backgrounded
        }
    }
}
