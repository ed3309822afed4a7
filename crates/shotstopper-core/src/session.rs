//! Device discovery and session management.
//!
//! A [`Session`] owns the one live [`PeripheralHandle`] and the
//! scan → connect → service-resolution sequence that produces it.
//! Connect attempts are single-flight: a call made while another is in
//! progress returns [`ConnectOutcome::InProgress`] without touching the
//! radio. Each attempt carries a [`CancellationToken`]; leaving the
//! foreground or losing the radio cancels it at its next suspension point.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use shotstopper_types::{AddressingScheme, Setting};

use crate::config::SessionConfig;
use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::events::{DisconnectReason, EventDispatcher, SessionEvent, TransportEvent};
use crate::permission::PermissionGate;
use crate::scan::{PeripheralId, PeripheralInfo, ScanFilter};
use crate::state::{RadioState, StateHub};
use crate::traits::Transport;
use crate::util::timed;

/// The bound peripheral and the layout its characteristics use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralHandle {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub scheme: AddressingScheme,
}

impl PeripheralHandle {
    /// Service identifier for this peripheral's layout.
    pub fn service(&self) -> Uuid {
        self.scheme.service()
    }

    /// Characteristic identifier holding `setting`.
    pub fn characteristic(&self, setting: Setting) -> Uuid {
        self.scheme.characteristic(setting)
    }
}

/// Called once a peripheral is bound, before the session reports connected.
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// Errors are logged; the session stays connected with partial settings.
    async fn on_session_established(&self, handle: &PeripheralHandle) -> Result<()>;
}

/// Result of a [`Session::connect`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A peripheral was bound and swept.
    Connected(PeripheralHandle),
    /// A peripheral was already bound.
    AlreadyConnected(PeripheralHandle),
    /// Another connect attempt holds the latch.
    InProgress,
    /// The app is not in the foreground.
    NotForeground,
    /// The attempt was abandoned after the app left the foreground or the
    /// radio went off. Nothing stays bound.
    Cancelled,
}

/// Holds the connect latch until dropped.
///
/// The latch stores the generation of the attempt holding it, zero when
/// free. Dropping only releases the latch if it still belongs to this
/// attempt, so a retired attempt cannot free a latch a newer one holds.
struct ConnectLatch<'a> {
    slot: &'a AtomicU64,
    generation: u64,
}

impl<'a> ConnectLatch<'a> {
    fn acquire(slot: &'a AtomicU64, generations: &AtomicU64) -> Option<Self> {
        let generation = generations.fetch_add(1, Ordering::AcqRel) + 1;
        slot.compare_exchange(0, generation, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { slot, generation })
    }
}

impl Drop for ConnectLatch<'_> {
    fn drop(&mut self) {
        let _ = self.slot.compare_exchange(
            self.generation,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Owner of the wireless link to one peripheral.
pub struct Session {
    transport: Arc<dyn Transport>,
    gate: PermissionGate,
    state: StateHub,
    events: EventDispatcher,
    config: SessionConfig,
    handle: RwLock<Option<PeripheralHandle>>,
    /// Generation of the attempt holding the latch; zero when free.
    connecting: AtomicU64,
    generations: AtomicU64,
    /// Token of the newest attempt.
    attempt: Mutex<CancellationToken>,
    /// Held for the whole body of an attempt so a retired attempt finishes
    /// its cleanup before the next one touches the radio.
    running: AsyncMutex<()>,
    foreground: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device_name", &self.config.device_name)
            .field("connecting", &self.is_connecting())
            .field("foreground", &self.foreground.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: PermissionGate,
        state: StateHub,
        events: EventDispatcher,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            gate,
            state,
            events,
            config,
            handle: RwLock::new(None),
            connecting: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            attempt: Mutex::new(CancellationToken::new()),
            running: AsyncMutex::new(()),
            foreground: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The bound peripheral, if any.
    pub async fn handle(&self) -> Option<PeripheralHandle> {
        self.handle.read().await.clone()
    }

    /// Whether a connect attempt currently holds the latch.
    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire) != 0
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::Acquire)
    }

    pub(crate) fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::Release);
    }

    /// Cancel the in-flight attempt and release the latch it holds.
    pub(crate) fn reset_latch(&self) {
        self.cancel_attempt();
        self.connecting.store(0, Ordering::Release);
    }

    /// Cancel the in-flight attempt, if any. It unwinds at its next
    /// suspension point and leaves nothing bound.
    pub(crate) fn cancel_attempt(&self) {
        self.attempt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    fn begin_attempt(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.attempt.lock().unwrap_or_else(|e| e.into_inner()) = token.clone();
        token
    }

    /// Find, bind and sweep the peripheral.
    ///
    /// Failures are also published as `last_error` with `scanning` cleared.
    #[instrument(skip_all, fields(device = %self.config.device_name))]
    pub async fn connect(&self, listener: &dyn SessionListener) -> Result<ConnectOutcome> {
        let Some(_latch) = ConnectLatch::acquire(&self.connecting, &self.generations) else {
            debug!("Connect already in progress");
            return Ok(ConnectOutcome::InProgress);
        };

        // Registered before the foreground check so a background transition
        // racing this call cancels the token.
        let token = self.begin_attempt();
        if !self.is_foreground() {
            debug!("Not in foreground; skipping connect");
            return Ok(ConnectOutcome::NotForeground);
        }

        let _running = self.running.lock().await;
        if token.is_cancelled() {
            return Ok(ConnectOutcome::Cancelled);
        }

        if let Some(handle) = self.handle().await {
            debug!(id = %handle.id, "Already connected");
            return Ok(ConnectOutcome::AlreadyConnected(handle));
        }

        match self.connect_inner(listener, &token).await {
            Ok(handle) => Ok(ConnectOutcome::Connected(handle)),
            Err(e) if token.is_cancelled() => {
                info!("Connect attempt cancelled: {}", e);
                Ok(ConnectOutcome::Cancelled)
            }
            Err(e) => {
                warn!("Connect failed: {}", e);
                self.state.set_error(e.kind());
                self.state.set_scanning(false);
                self.events.send(SessionEvent::Error {
                    kind: e.kind(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Start a connect attempt in the background.
    pub fn spawn_connect(self: &Arc<Self>, listener: Arc<dyn SessionListener>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            match session.connect(listener.as_ref()).await {
                Ok(outcome) => debug!(?outcome, "Connect attempt finished"),
                Err(e) => debug!("Connect attempt failed: {}", e),
            }
        })
    }

    async fn connect_inner(
        &self,
        listener: &dyn SessionListener,
        token: &CancellationToken,
    ) -> Result<PeripheralHandle> {
        cancellable(token, self.gate.request_permissions()).await?;

        let radio = cancellable(token, self.transport.radio_state()).await?;
        self.state.set_radio_state(radio);
        if radio != RadioState::On {
            return Err(Error::RadioOff);
        }

        let connected =
            cancellable(token, async { Ok::<_, Error>(self.find_connected().await) }).await?;
        let info = match connected {
            Some(info) => {
                info!(id = %info.id, "Using already-connected peripheral");
                info
            }
            None => self.scan(token).await?,
        };

        self.establish(info, listener, token).await
    }

    async fn find_connected(&self) -> Option<PeripheralInfo> {
        match self.transport.connected_peripherals().await {
            Ok(peripherals) => peripherals.into_iter().find(|p| {
                p.name
                    .as_deref()
                    .is_some_and(|name| self.config.matches_name(name))
            }),
            Err(e) => {
                warn!("Could not list connected peripherals: {}", e);
                None
            }
        }
    }

    /// Scan until the first matching advertisement or the scan window closes.
    async fn scan(&self, token: &CancellationToken) -> Result<PeripheralInfo> {
        let filter = ScanFilter::accepted_services(self.config.scan_mode, self.config.scan_duration);
        // Subscribe first so no advertisement is missed.
        let mut events = self.transport.events();

        self.state.clear_error();
        self.state.set_scanning(true);
        self.events.send(SessionEvent::ScanStarted);
        info!(duration = ?filter.duration, mode = ?filter.mode, "Scanning");
        if let Err(e) = cancellable(token, self.transport.start_scan(&filter)).await {
            if token.is_cancelled() {
                if let Err(stop_err) = self.transport.stop_scan().await {
                    debug!("Failed to stop cancelled scan: {}", stop_err);
                }
            } else {
                self.state.set_scanning(false);
            }
            return Err(e);
        }

        let deadline = Instant::now() + filter.duration;
        let found = loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break Err(Error::Cancelled),
                next = tokio::time::timeout_at(deadline, events.recv()) => next,
            };
            match next {
                Err(_) => break Ok(None),
                Ok(Ok(TransportEvent::Discovered(info))) => {
                    if filter.selects(&info) {
                        debug!(id = %info.id, name = ?info.name, "Selected peripheral");
                        self.events.send(SessionEvent::PeripheralDiscovered {
                            peripheral: info.clone(),
                        });
                        break Ok(Some(info));
                    }
                    trace!(id = %info.id, "Ignoring advertisement without an accepted service");
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "Scan fell behind adapter events");
                }
                Ok(Err(RecvError::Closed)) => {
                    break Err(Error::connect_failed("adapter event stream closed"));
                }
            }
        };

        if let Err(e) = self.transport.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        // A cancelling transition owns the published scanning flag.
        if !token.is_cancelled() {
            self.state.set_scanning(false);
        }

        let found = found?;
        self.events.send(SessionEvent::ScanStopped {
            matched: found.is_some(),
        });
        found.ok_or(Error::DeviceNotFound(DeviceNotFoundReason::ScanTimeout {
            duration: filter.duration,
        }))
    }

    /// Connect, resolve services, bind and sweep.
    #[instrument(skip_all, fields(id = %info.id))]
    async fn establish(
        &self,
        info: PeripheralInfo,
        listener: &dyn SessionListener,
        token: &CancellationToken,
    ) -> Result<PeripheralHandle> {
        let id = info.id.clone();

        let connected = cancellable(
            token,
            timed(
                "connect",
                self.config.connect_timeout,
                self.transport.connect(&id),
            ),
        )
        .await;
        if let Err(e) = connected {
            // The platform may finish a connect that was cancelled mid-flight.
            if matches!(e, Error::Cancelled) {
                self.release_unbound(&id).await;
            }
            return Err(e);
        }

        let handle = match cancellable(token, self.resolve(&info)).await {
            Ok(handle) => handle,
            Err(e) => {
                self.release_unbound(&id).await;
                return Err(e);
            }
        };

        {
            let mut slot = self.handle.write().await;
            if token.is_cancelled() {
                drop(slot);
                self.release_unbound(&id).await;
                return Err(Error::Cancelled);
            }
            *slot = Some(handle.clone());
        }
        info!(scheme = ?handle.scheme, "Peripheral bound");

        match cancellable(token, listener.on_session_established(&handle)).await {
            Err(Error::Cancelled) => {
                self.release_bound(&handle).await;
                return Err(Error::Cancelled);
            }
            Err(e) => warn!("Settings sweep incomplete, keeping partial settings: {}", e),
            Ok(()) => {}
        }

        // Held across the publish so a cancelling transition, which clears
        // the handle under the write lock, orders after it.
        let bound = self.handle.read().await;
        if token.is_cancelled() {
            drop(bound);
            self.release_bound(&handle).await;
            return Err(Error::Cancelled);
        }
        // The link may have dropped during the sweep.
        if bound.as_ref() != Some(&handle) {
            return Err(Error::ConnectionLost);
        }
        self.state.set_connected(true);
        drop(bound);

        self.events.send(SessionEvent::Connected {
            id: handle.id.clone(),
            name: handle.name.clone(),
        });
        Ok(handle)
    }

    /// Close a link that was never published as the bound handle.
    async fn release_unbound(&self, id: &PeripheralId) {
        if let Err(e) = self.transport.disconnect(id).await {
            debug!("Cleanup disconnect failed: {}", e);
        }
    }

    /// Unbind `handle` if no one else has, then close its link.
    async fn release_bound(&self, handle: &PeripheralHandle) {
        let mut slot = self.handle.write().await;
        if slot.as_ref() != Some(handle) {
            return;
        }
        *slot = None;
        drop(slot);
        self.state.set_connected(false);
        self.release_unbound(&handle.id).await;
    }

    async fn resolve(&self, info: &PeripheralInfo) -> Result<PeripheralHandle> {
        if self.config.platform.supports_connection_priority
            && let Err(e) = self.transport.request_high_priority(&info.id).await
        {
            debug!("High priority request rejected: {}", e);
        }

        let services = timed(
            "discover services",
            self.config.discovery_timeout,
            self.transport.discover_services(&info.id),
        )
        .await?;

        let scheme = AddressingScheme::from_services(&services)
            .or_else(|| info.scheme())
            .ok_or_else(|| Error::connect_failed("peripheral exposes no shotStopper service"))?;

        Ok(PeripheralHandle {
            id: info.id.clone(),
            name: info.name.clone(),
            scheme,
        })
    }

    /// Close the link at the user's request.
    pub async fn disconnect(&self) -> Result<()> {
        self.disconnect_with(DisconnectReason::UserRequested).await
    }

    /// Clear the handle, mark disconnected and close the link.
    ///
    /// The handle is cleared even if the transport reports an error.
    pub(crate) async fn disconnect_with(&self, reason: DisconnectReason) -> Result<()> {
        let handle = self.handle.write().await.take();
        self.state.set_connected(false);

        let Some(handle) = handle else {
            return Ok(());
        };

        info!(id = %handle.id, ?reason, "Disconnecting");
        let result = self.transport.disconnect(&handle.id).await;
        if let Err(e) = &result {
            warn!("Transport disconnect failed: {}", e);
        }
        self.events.send(SessionEvent::Disconnected {
            id: handle.id,
            reason,
        });
        result
    }

    /// The platform reported that `id` dropped.
    ///
    /// Does not reconnect; that is left to radio and app-state transitions.
    pub(crate) async fn handle_disconnected(&self, id: &PeripheralId) {
        let mut guard = self.handle.write().await;
        if guard.as_ref().is_none_or(|h| h.id != *id) {
            return;
        }
        *guard = None;
        drop(guard);

        info!(%id, "Peripheral disconnected");
        self.state.set_connected(false);
        self.events.send(SessionEvent::Disconnected {
            id: id.clone(),
            reason: DisconnectReason::LinkLost,
        });
    }
}

/// Run `future` unless `token` is cancelled first.
async fn cancellable<T>(
    token: &CancellationToken,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use shotstopper_types::uuid::{SERVICE_LEGACY, SERVICE_PRIMARY};

    use crate::error::ErrorKind;
    use crate::mock::{MockPeripheral, MockPermissions, MockTransport};
    use crate::platform::{Platform, PlatformConfig};

    #[derive(Default)]
    struct CountingListener(AtomicU32);

    #[async_trait]
    impl SessionListener for CountingListener {
        async fn on_session_established(&self, _: &PeripheralHandle) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn session(transport: &Arc<MockTransport>) -> Session {
        session_with_permissions(transport, MockPermissions::granting(), Platform::Linux)
    }

    fn session_with_permissions(
        transport: &Arc<MockTransport>,
        permissions: MockPermissions,
        platform: Platform,
    ) -> Session {
        let config = SessionConfig::for_platform(PlatformConfig::for_platform(platform))
            .scan_duration(Duration::from_secs(5));
        Session::new(
            transport.clone(),
            PermissionGate::new(Arc::new(permissions), platform),
            StateHub::new(Default::default()),
            EventDispatcher::default(),
            config,
        )
    }

    #[test]
    fn test_retired_latch_does_not_release_newer_one() {
        let slot = AtomicU64::new(0);
        let generations = AtomicU64::new(0);

        let stale = ConnectLatch::acquire(&slot, &generations).unwrap();
        slot.store(0, Ordering::Release);
        let current = ConnectLatch::acquire(&slot, &generations).unwrap();

        drop(stale);
        assert!(ConnectLatch::acquire(&slot, &generations).is_none());
        drop(current);
        assert_eq!(slot.load(Ordering::Acquire), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_mid_connect_cancels_attempt() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("current"));
        transport.set_connect_latency(Duration::from_millis(300));
        let session = session(&transport);
        let listener = CountingListener::default();

        let (outcome, ()) = tokio::join!(session.connect(&listener), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.set_foreground(false);
            session.cancel_attempt();
        });

        assert_eq!(outcome.unwrap(), ConnectOutcome::Cancelled);
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);
        assert!(session.handle().await.is_none());
        assert!(!session.state.snapshot().connection.connected);
        assert!(!session.is_connecting());
        assert!(transport.connected_ids().is_empty());
    }

    #[tokio::test]
    async fn test_connect_binds_first_match() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("other").services(vec![]));
        transport.add_peripheral(MockPeripheral::new("legacy").services(vec![SERVICE_LEGACY]));
        transport.add_peripheral(MockPeripheral::new("current").services(vec![SERVICE_PRIMARY]));
        let session = session(&transport);
        let listener = CountingListener::default();

        let outcome = session.connect(&listener).await.unwrap();
        let ConnectOutcome::Connected(handle) = outcome else {
            panic!("expected Connected, got {:?}", outcome);
        };
        assert_eq!(handle.id.as_str(), "legacy");
        assert_eq!(handle.scheme, AddressingScheme::Legacy);
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
        assert!(session.state.snapshot().connection.connected);
        assert_eq!(transport.stats().scans_stopped, 1);
        assert_eq!(transport.connected_ids(), vec![PeripheralId::new("legacy")]);
    }

    #[tokio::test]
    async fn test_already_connected_peripheral_skips_scan() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("bonded").already_connected());
        let session = session(&transport);

        let outcome = session.connect(&CountingListener::default()).await.unwrap();
        assert!(matches!(outcome, ConnectOutcome::Connected(_)));
        assert_eq!(transport.stats().scans_started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_timeout_publishes_device_not_found() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport);

        let err = session
            .connect(&CountingListener::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceNotFound(DeviceNotFoundReason::ScanTimeout { .. })
        ));
        let connection = session.state.snapshot().connection;
        assert!(!connection.scanning);
        assert!(!connection.connected);
        assert_eq!(connection.last_error, Some(ErrorKind::DeviceNotFound));
        assert!(!session.is_connecting());
    }

    #[tokio::test]
    async fn test_radio_off_aborts_before_scan() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("current"));
        transport.set_radio_state(RadioState::Off);
        let session = session(&transport);

        let err = session
            .connect(&CountingListener::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RadioOff));
        assert_eq!(transport.stats().scans_started, 0);
        let connection = session.state.snapshot().connection;
        assert_eq!(connection.last_error, Some(ErrorKind::RadioOff));
        assert_eq!(connection.radio_state, RadioState::Off);
    }

    #[tokio::test]
    async fn test_permission_denied_aborts_before_radio() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("current"));
        let session = session_with_permissions(
            &transport,
            MockPermissions::denying(),
            Platform::Android { api_level: 33 },
        );

        let err = session
            .connect(&CountingListener::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert_eq!(transport.stats().scans_started, 0);
        assert_eq!(
            session.state.snapshot().connection.last_error,
            Some(ErrorKind::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn test_not_foreground_is_silent() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("current"));
        let session = session(&transport);
        session.set_foreground(false);

        let before = session.state.snapshot();
        let outcome = session.connect(&CountingListener::default()).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::NotForeground);
        assert_eq!(session.state.snapshot(), before);
        assert_eq!(transport.stats().scans_started, 0);
    }

    #[tokio::test]
    async fn test_concurrent_connects_are_single_flight() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("current"));
        transport.set_connect_latency(Duration::from_millis(50));
        let session = session(&transport);
        let listener = CountingListener::default();

        let (a, b) = tokio::join!(session.connect(&listener), session.connect(&listener));
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, ConnectOutcome::InProgress))
                .count(),
            1
        );
        assert_eq!(transport.stats().scans_started, 1);
        assert_eq!(transport.stats().connects, 1);
    }

    #[tokio::test]
    async fn test_disconnect_event_clears_handle_without_reconnect() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("current"));
        let session = session(&transport);
        session.connect(&CountingListener::default()).await.unwrap();

        session
            .handle_disconnected(&PeripheralId::new("current"))
            .await;
        assert!(session.handle().await.is_none());
        assert!(!session.state.snapshot().connection.connected);
        assert_eq!(transport.stats().scans_started, 1);
    }

    #[tokio::test]
    async fn test_disconnect_event_for_other_peripheral_is_ignored() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("current"));
        let session = session(&transport);
        session.connect(&CountingListener::default()).await.unwrap();

        session.handle_disconnected(&PeripheralId::new("other")).await;
        assert!(session.handle().await.is_some());
    }

    #[tokio::test]
    async fn test_failed_service_resolution_cleans_up() {
        let transport = Arc::new(MockTransport::new());
        transport.add_peripheral(MockPeripheral::new("odd").exposed_services(vec![]));
        let session = session(&transport);

        // Advertised service still yields a scheme, so binding succeeds.
        let outcome = session.connect(&CountingListener::default()).await.unwrap();
        assert!(matches!(outcome, ConnectOutcome::Connected(_)));

        session.disconnect().await.unwrap();
        transport.add_peripheral(
            MockPeripheral::new("bare")
                .services(vec![])
                .exposed_services(vec![])
                .already_connected(),
        );
        let err = session
            .connect(&CountingListener::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { .. }));
        assert!(session.handle().await.is_none());
    }
}
