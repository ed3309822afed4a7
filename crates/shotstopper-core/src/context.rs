//! Published state surface.
//!
//! A [`SessionContext`] wires the permission gate, session, sync engine and
//! adapter monitor to one transport and one [`StateHub`]. It is created once
//! at startup and torn down with [`SessionContext::shutdown`]; consumers get
//! a [`ContextHandle`] instead of reaching for a global. A handle used after
//! its context is gone fails with [`Error::ContextUnavailable`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use shotstopper_core::{MockTransport, SessionContext, Setting};
//!
//! # async fn example() -> shotstopper_core::Result<()> {
//! let context = SessionContext::builder(Arc::new(MockTransport::demo()))
//!     .start()
//!     .await?;
//! let handle = context.handle();
//! handle.connect_and_wait().await?;
//! handle.sync()?.update_drip_delay(4).await?;
//! assert_eq!(handle.snapshot()?.settings.drip_delay, 4);
//! context.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use shotstopper_types::{DeviceSettings, Setting, SettingValue};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver, TransportEvent};
use crate::monitor::{AdapterMonitor, AppState, Transition};
use crate::permission::{PermissionGate, PlatformPermissions};
use crate::session::{ConnectOutcome, Session};
use crate::state::{RadioState, Snapshot, StateHub};
use crate::sync::SettingsSync;
use crate::traits::{PermissionProvider, SettingsCache, Transport};

/// Configures and starts a [`SessionContext`].
pub struct SessionContextBuilder {
    transport: Arc<dyn Transport>,
    permissions: Option<Arc<dyn PermissionProvider>>,
    cache: Option<Arc<dyn SettingsCache>>,
    config: SessionConfig,
    event_capacity: usize,
}

impl SessionContextBuilder {
    /// Permission provider; defaults to [`PlatformPermissions`].
    #[must_use]
    pub fn permissions(mut self, provider: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = Some(provider);
        self
    }

    /// Durable settings cache. Without one, settings start at the defaults.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn SettingsCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Capacity of the [`SessionEvent`](crate::events::SessionEvent) channel.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Validate the config, seed settings from the cache and start the event pump.
    ///
    /// Does not connect; the first connect is up to the caller.
    pub async fn start(self) -> Result<SessionContext> {
        self.config.validate()?;

        let seed = match &self.cache {
            Some(cache) => match cache.load() {
                Ok(Some(settings)) => {
                    debug!("Seeded settings from cache");
                    settings
                }
                Ok(None) => DeviceSettings::default(),
                Err(e) => {
                    warn!("Failed to load settings cache, using defaults: {}", e);
                    DeviceSettings::default()
                }
            },
            None => DeviceSettings::default(),
        };

        let platform = self.config.platform.platform;
        let provider = self
            .permissions
            .unwrap_or_else(|| Arc::new(PlatformPermissions));
        let state = StateHub::new(seed);
        let events = EventDispatcher::new(self.event_capacity);

        let session = Arc::new(Session::new(
            Arc::clone(&self.transport),
            PermissionGate::new(provider, platform),
            state.clone(),
            events.clone(),
            self.config,
        ));
        let sync = Arc::new(SettingsSync::new(
            Arc::clone(&session),
            Arc::clone(&self.transport),
            state.clone(),
            events.clone(),
            self.cache,
        ));
        let monitor = Arc::new(AdapterMonitor::new(
            Arc::clone(&session),
            sync.clone(),
            state.clone(),
            events.clone(),
        ));

        match self.transport.radio_state().await {
            Ok(radio) => monitor.prime_radio_state(radio),
            Err(e) => debug!("Radio state unavailable at startup: {}", e),
        }

        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump_transport_events(
            self.transport.events(),
            Arc::clone(&session),
            Arc::clone(&sync),
            Arc::clone(&monitor),
            cancel.clone(),
        ));

        info!("Session context started");
        Ok(SessionContext {
            inner: Arc::new(Inner {
                session,
                sync,
                monitor,
                state,
                events,
            }),
            cancel,
            pump: Some(pump),
        })
    }
}

struct Inner {
    session: Arc<Session>,
    sync: Arc<SettingsSync>,
    monitor: Arc<AdapterMonitor>,
    state: StateHub,
    events: EventDispatcher,
}

/// Owner of the one live session and its published state.
pub struct SessionContext {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session", &self.inner.session)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn builder(transport: Arc<dyn Transport>) -> SessionContextBuilder {
        SessionContextBuilder {
            transport,
            permissions: None,
            cache: None,
            config: SessionConfig::default(),
            event_capacity: 100,
        }
    }

    /// A handle for consumers. It does not keep the context alive.
    pub fn handle(&self) -> ContextHandle {
        ContextHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    /// Disconnect, return in-memory settings to defaults and stop the event pump.
    ///
    /// The durable cache is left as is.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.inner.session.disconnect().await {
            warn!("Disconnect during shutdown failed: {}", e);
        }
        self.inner.state.replace_settings(DeviceSettings::default());
        self.cancel.cancel();
        if let Some(pump) = self.pump.take()
            && let Err(e) = pump.await
        {
            warn!("Event pump ended abnormally: {}", e);
        }
        info!("Session context shut down");
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Consumer-side access to a [`SessionContext`].
#[derive(Clone)]
pub struct ContextHandle {
    inner: Weak<Inner>,
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("live", &self.is_live())
            .finish()
    }
}

impl ContextHandle {
    fn inner(&self) -> Result<Arc<Inner>> {
        self.inner.upgrade().ok_or(Error::ContextUnavailable)
    }

    /// Whether the owning context still exists.
    pub fn is_live(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.inner()?.state.snapshot())
    }

    pub fn subscribe(&self) -> Result<watch::Receiver<Snapshot>> {
        Ok(self.inner()?.state.subscribe())
    }

    pub fn events(&self) -> Result<EventReceiver> {
        Ok(self.inner()?.events.subscribe())
    }

    /// The sync engine, for the typed read/update operations.
    pub fn sync(&self) -> Result<Arc<SettingsSync>> {
        Ok(Arc::clone(&self.inner()?.sync))
    }

    /// Start a connect attempt in the background.
    pub fn connect(&self) -> Result<JoinHandle<()>> {
        let inner = self.inner()?;
        Ok(inner.session.spawn_connect(inner.sync.clone()))
    }

    /// Connect and wait for the attempt to finish.
    pub async fn connect_and_wait(&self) -> Result<ConnectOutcome> {
        let inner = self.inner()?;
        inner.session.connect(inner.sync.as_ref()).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.inner()?.session.disconnect().await
    }

    pub async fn read(&self, setting: Setting) -> Result<SettingValue> {
        self.inner()?.sync.read(setting).await
    }

    pub async fn update(&self, setting: Setting, value: SettingValue) -> Result<()> {
        self.inner()?.sync.update_setting(setting, value).await
    }

    pub async fn read_all_settings(&self) -> Result<DeviceSettings> {
        self.inner()?.sync.read_all_settings().await
    }

    pub async fn reset_to_defaults(&self) -> Result<()> {
        self.inner()?.sync.reset_to_defaults().await
    }

    /// Report an app lifecycle change.
    ///
    /// Backgrounding returns only after the link is released.
    pub async fn app_state_changed(&self, app: AppState) -> Result<Transition> {
        Ok(self.inner()?.monitor.on_app_state(app).await)
    }

    /// Report a radio power change for transports that do not emit one.
    pub async fn radio_state_changed(&self, radio: RadioState) -> Result<Transition> {
        Ok(self.inner()?.monitor.on_radio_state(radio).await)
    }
}

/// Route adapter events to the component that owns them.
async fn pump_transport_events(
    mut rx: broadcast::Receiver<TransportEvent>,
    session: Arc<Session>,
    sync: Arc<SettingsSync>,
    monitor: Arc<AdapterMonitor>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Event pump cancelled");
                break;
            }
            event = rx.recv() => match event {
                Ok(TransportEvent::Disconnected(id)) => session.handle_disconnected(&id).await,
                Ok(TransportEvent::RadioStateChanged(radio)) => {
                    let transition = monitor.on_radio_state(radio).await;
                    trace!(?transition, "Radio transition");
                }
                Ok(TransportEvent::Notification { id, characteristic, value }) => {
                    sync.handle_notification(&id, characteristic, &value).await;
                }
                Ok(TransportEvent::Discovered(_)) => {}
                Err(RecvError::Lagged(n)) => warn!("Event pump lagged by {} events", n),
                Err(RecvError::Closed) => {
                    debug!("Transport event channel closed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPeripheral, MockTransport};
    use crate::platform::PlatformConfig;

    fn linux_config() -> SessionConfig {
        SessionConfig::for_platform(PlatformConfig::linux())
    }

    #[tokio::test]
    async fn test_start_seeds_from_cache() {
        let cache = Arc::new(crate::cache::MemoryCache::with_settings(DeviceSettings {
            weight_value: 41,
            ..Default::default()
        }));
        let context = SessionContext::builder(Arc::new(MockTransport::new()))
            .config(linux_config())
            .cache(cache)
            .start()
            .await
            .unwrap();

        let snapshot = context.snapshot();
        assert_eq!(snapshot.settings.weight_value, 41);
        assert_eq!(snapshot.connection.radio_state, RadioState::On);
        assert!(!snapshot.connection.connected);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let result = SessionContext::builder(Arc::new(MockTransport::new()))
            .config(linux_config().device_name(""))
            .start()
            .await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_handle_outlived_context_fails_fast() {
        let context = SessionContext::builder(Arc::new(MockTransport::new()))
            .config(linux_config())
            .start()
            .await
            .unwrap();
        let handle = context.handle();
        assert!(handle.snapshot().is_ok());

        context.shutdown().await;
        assert!(!handle.is_live());
        assert!(matches!(handle.snapshot(), Err(Error::ContextUnavailable)));
        assert!(matches!(
            handle.connect_and_wait().await,
            Err(Error::ContextUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_and_resets_memory() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("p").value(Setting::DripDelay, 8));
        let context = SessionContext::builder(transport.clone())
            .config(linux_config())
            .start()
            .await
            .unwrap();
        let mut rx = context.subscribe();
        context.handle().connect_and_wait().await.unwrap();
        assert_eq!(context.snapshot().settings.drip_delay, 8);

        context.shutdown().await;
        assert!(transport.connected_ids().is_empty());
        let last = *rx.borrow_and_update();
        assert_eq!(last.settings, DeviceSettings::default());
        assert!(!last.connection.connected);
    }

    #[tokio::test]
    async fn test_pump_routes_link_drop() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("p"));
        let context = SessionContext::builder(transport.clone())
            .config(linux_config())
            .start()
            .await
            .unwrap();
        let handle = context.handle();
        handle.connect_and_wait().await.unwrap();

        let mut rx = context.subscribe();
        transport.simulate_disconnect(&crate::scan::PeripheralId::new("p"));
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            rx.wait_for(|s| !s.connection.connected),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(transport.stats().scans_started, 1);
    }
}
