//! Parameter sync engine.
//!
//! Maps each [`Setting`] to its characteristic on the bound peripheral.
//! Reads retry with a fixed backoff. Writes are confirmed before the
//! published value changes; a failed write restores the previous value and
//! tears the session down, since it is taken as a sign the link is bad.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use shotstopper_types::{DeviceSettings, RESET_SEQUENCE, ScaleStatus, Setting, SettingValue};

use crate::config::{CachePolicy, SessionConfig};
use crate::error::{Error, Result};
use crate::events::{DisconnectReason, EventDispatcher, SessionEvent};
use crate::retry::{is_retryable, with_retry};
use crate::scan::PeripheralId;
use crate::session::{PeripheralHandle, Session, SessionListener};
use crate::state::StateHub;
use crate::traits::{SettingsCache, Transport};
use crate::util::timed;

/// Reads and writes settings on the peripheral bound by a [`Session`].
pub struct SettingsSync {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    state: StateHub,
    events: EventDispatcher,
    cache: Option<Arc<dyn SettingsCache>>,
    config: SessionConfig,
}

impl std::fmt::Debug for SettingsSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsSync")
            .field("cache_policy", &self.config.cache_policy)
            .field("has_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl SettingsSync {
    pub fn new(
        session: Arc<Session>,
        transport: Arc<dyn Transport>,
        state: StateHub,
        events: EventDispatcher,
        cache: Option<Arc<dyn SettingsCache>>,
    ) -> Self {
        let config = session.config().clone();
        Self {
            session,
            transport,
            state,
            events,
            cache,
            config,
        }
    }

    async fn bound(&self) -> Result<PeripheralHandle> {
        self.session.handle().await.ok_or(Error::DeviceNotBound)
    }

    /// Read `setting` straight from the peripheral, retrying transient failures.
    ///
    /// Does not touch published state.
    pub async fn read_characteristic(&self, setting: Setting) -> Result<SettingValue> {
        let handle = self.bound().await?;
        let service = handle.service();
        let characteristic = handle.characteristic(setting);
        let operation = format!("read {}", setting);

        let bytes = with_retry(&self.config.read_retry, &operation, || {
            let transport = Arc::clone(&self.transport);
            let id = handle.id.clone();
            let operation = operation.as_str();
            async move {
                timed(
                    operation,
                    self.config.read_timeout,
                    transport.read(&id, service, characteristic),
                )
                .await
            }
        })
        .await
        .map_err(|e| {
            if is_retryable(&e) {
                Error::ReadFailed {
                    setting,
                    attempts: self.config.read_retry.total_attempts(),
                    source: Box::new(e),
                }
            } else {
                e
            }
        })?;

        Ok(setting.decode(&bytes)?)
    }

    /// Read `setting` and publish the confirmed value.
    pub async fn read(&self, setting: Setting) -> Result<SettingValue> {
        let value = self.read_characteristic(setting).await?;
        self.state.apply_setting(setting, value);
        Ok(value)
    }

    pub async fn read_weight_value(&self) -> Result<u8> {
        self.read_byte(Setting::WeightValue).await
    }

    pub async fn read_reed_switch(&self) -> Result<bool> {
        self.read_flag(Setting::ReedSwitch).await
    }

    pub async fn read_momentary(&self) -> Result<bool> {
        self.read_flag(Setting::Momentary).await
    }

    pub async fn read_auto_tare(&self) -> Result<bool> {
        self.read_flag(Setting::AutoTare).await
    }

    pub async fn read_min_shot_duration(&self) -> Result<u8> {
        self.read_byte(Setting::MinShotDuration).await
    }

    pub async fn read_max_shot_duration(&self) -> Result<u8> {
        self.read_byte(Setting::MaxShotDuration).await
    }

    pub async fn read_drip_delay(&self) -> Result<u8> {
        self.read_byte(Setting::DripDelay).await
    }

    pub async fn read_firmware_version(&self) -> Result<u8> {
        self.read_byte(Setting::FirmwareVersion).await
    }

    pub async fn read_scale_status(&self) -> Result<ScaleStatus> {
        match self.read(Setting::ScaleStatus).await? {
            SettingValue::Status(status) => Ok(status),
            other => Err(Error::InvalidData(format!(
                "unexpected scale status {}",
                other
            ))),
        }
    }

    async fn read_flag(&self, setting: Setting) -> Result<bool> {
        self.read(setting).await?.as_bool().ok_or_else(|| {
            Error::InvalidData(format!("{} did not decode as a flag", setting))
        })
    }

    async fn read_byte(&self, setting: Setting) -> Result<u8> {
        self.read(setting).await?.as_byte().ok_or_else(|| {
            Error::InvalidData(format!("{} did not decode as a byte", setting))
        })
    }

    /// Write `value` to `setting` and publish it once the peripheral confirms.
    ///
    /// Skips the radio entirely if the published value already encodes to
    /// the same byte. On failure the previous value is restored, the
    /// session is disconnected, and [`Error::WriteFailed`] is returned.
    #[instrument(skip(self), fields(setting = %setting, value = %value))]
    pub async fn update_setting(&self, setting: Setting, value: SettingValue) -> Result<()> {
        if !setting.is_writable() {
            return Err(Error::write_failed(setting, "setting is read-only"));
        }

        let previous = self.state.settings();
        let mut next = previous;
        next.set(setting, value)?;

        if previous.holds(setting, value) {
            debug!("Value unchanged; skipping write");
            return Ok(());
        }

        let handle = self.bound().await?;

        self.state.set_loading(true);
        let result = timed(
            &format!("write {}", setting),
            self.config.write_timeout,
            self.transport.write(
                &handle.id,
                handle.service(),
                handle.characteristic(setting),
                &value.encode(),
            ),
        )
        .await;

        let outcome = match result {
            Ok(()) => {
                let confirmed = next.get(setting);
                self.state.apply_setting(setting, confirmed);
                self.events.send(SessionEvent::SettingWritten {
                    setting,
                    value: confirmed,
                });
                info!("Setting written");
                self.persist();
                Ok(())
            }
            Err(e) => {
                let restored = previous.get(setting);
                self.state.apply_setting(setting, restored);
                self.events.send(SessionEvent::WriteRolledBack { setting, restored });
                warn!("Write failed, restored previous value and disconnecting: {}", e);
                if let Err(disconnect_err) = self
                    .session
                    .disconnect_with(DisconnectReason::WriteFailed)
                    .await
                {
                    debug!("Disconnect after failed write failed: {}", disconnect_err);
                }
                Err(Error::write_failed(setting, e.to_string()))
            }
        };

        self.state.set_loading(false);
        outcome
    }

    pub async fn update_weight_value(&self, grams: i64) -> Result<()> {
        self.update_setting(Setting::WeightValue, SettingValue::Int(grams))
            .await
    }

    /// Older name for [`update_weight_value`](Self::update_weight_value).
    pub async fn update_timer_value(&self, value: i64) -> Result<()> {
        self.update_weight_value(value).await
    }

    pub async fn update_reed_switch(&self, enabled: bool) -> Result<()> {
        self.update_setting(Setting::ReedSwitch, SettingValue::Bool(enabled))
            .await
    }

    pub async fn update_momentary(&self, enabled: bool) -> Result<()> {
        self.update_setting(Setting::Momentary, SettingValue::Bool(enabled))
            .await
    }

    pub async fn update_auto_tare(&self, enabled: bool) -> Result<()> {
        self.update_setting(Setting::AutoTare, SettingValue::Bool(enabled))
            .await
    }

    pub async fn update_min_shot_duration(&self, seconds: i64) -> Result<()> {
        self.update_setting(Setting::MinShotDuration, SettingValue::Int(seconds))
            .await
    }

    pub async fn update_max_shot_duration(&self, seconds: i64) -> Result<()> {
        self.update_setting(Setting::MaxShotDuration, SettingValue::Int(seconds))
            .await
    }

    pub async fn update_drip_delay(&self, seconds: i64) -> Result<()> {
        self.update_setting(Setting::DripDelay, SettingValue::Int(seconds))
            .await
    }

    /// Read every setting the firmware supports.
    ///
    /// Firmware version (0 if unreadable) and target weight are read first.
    /// Only firmware reporting a non-zero version has the extended set;
    /// those six are read concurrently and scale status notifications are
    /// enabled. Individual extended-read failures keep the previous value.
    #[instrument(skip(self))]
    pub async fn read_all_settings(&self) -> Result<DeviceSettings> {
        self.bound().await?;

        let firmware_version = match self.read_firmware_version().await {
            Ok(version) => version,
            Err(e) => {
                warn!("Firmware version unreadable, assuming 0: {}", e);
                self.state
                    .apply_setting(Setting::FirmwareVersion, SettingValue::Int(0));
                0
            }
        };
        self.read(Setting::WeightValue).await?;

        let extended = firmware_version > 0;
        if extended {
            let [a, b, c, d, e, f] = Setting::EXTENDED;
            let results = futures::join!(
                self.read(a),
                self.read(b),
                self.read(c),
                self.read(d),
                self.read(e),
                self.read(f),
            );
            for (setting, result) in [
                (a, results.0),
                (b, results.1),
                (c, results.2),
                (d, results.3),
                (e, results.4),
                (f, results.5),
            ] {
                if let Err(err) = result {
                    warn!("Could not read {}: {}", setting, err);
                }
            }

            if let Err(e) = self.subscribe_scale_status().await {
                warn!("Scale status notifications unavailable: {}", e);
            }
        } else {
            debug!("Firmware without extended settings");
        }

        let settings = self.state.settings();
        self.persist();
        self.events.send(SessionEvent::SettingsRead {
            firmware_version,
            extended,
        });
        info!(firmware_version, extended, "Settings read");
        Ok(settings)
    }

    async fn subscribe_scale_status(&self) -> Result<()> {
        let handle = self.bound().await?;
        self.transport
            .subscribe(
                &handle.id,
                handle.service(),
                handle.characteristic(Setting::ScaleStatus),
            )
            .await
    }

    /// Write the factory defaults one setting at a time.
    ///
    /// Published settings change only after every write succeeds. A failure
    /// partway leaves the earlier defaults applied on the peripheral, the
    /// published settings untouched, and the session disconnected.
    #[instrument(skip(self))]
    pub async fn reset_to_defaults(&self) -> Result<()> {
        let handle = self.bound().await?;

        self.state.set_loading(true);
        let mut outcome = Ok(());
        for (setting, value) in RESET_SEQUENCE {
            let result = timed(
                &format!("write {}", setting),
                self.config.write_timeout,
                self.transport.write(
                    &handle.id,
                    handle.service(),
                    handle.characteristic(setting),
                    &value.encode(),
                ),
            )
            .await;
            if let Err(e) = result {
                warn!("Reset stopped at {}: {}", setting, e);
                if let Err(disconnect_err) = self
                    .session
                    .disconnect_with(DisconnectReason::WriteFailed)
                    .await
                {
                    debug!("Disconnect after failed write failed: {}", disconnect_err);
                }
                outcome = Err(Error::write_failed(setting, e.to_string()));
                break;
            }
        }

        if outcome.is_ok() {
            let reset = self.state.settings().reset();
            self.state.replace_settings(reset);
            self.persist();
            info!("Settings reset to defaults");
        }
        self.state.set_loading(false);
        outcome
    }

    /// Merge a notified value from the bound peripheral.
    pub(crate) async fn handle_notification(
        &self,
        id: &PeripheralId,
        characteristic: uuid::Uuid,
        value: &[u8],
    ) {
        let Some(handle) = self.session.handle().await else {
            return;
        };
        if handle.id != *id {
            return;
        }
        let Some(setting) = handle.scheme.setting_for(&characteristic) else {
            debug!(%characteristic, "Notification for unknown characteristic");
            return;
        };

        match setting.decode(value) {
            Ok(decoded) => {
                if self.state.apply_setting(setting, decoded)
                    && let SettingValue::Status(status) = decoded
                {
                    debug!(%status, "Scale status changed");
                    self.events.send(SessionEvent::ScaleStatusChanged { status });
                }
            }
            Err(e) => warn!("Bad notification for {}: {}", setting, e),
        }
    }

    fn persist(&self) {
        if self.config.cache_policy != CachePolicy::WriteThrough {
            return;
        }
        if let Some(cache) = &self.cache
            && let Err(e) = cache.save(&self.state.settings())
        {
            warn!("Failed to save settings cache: {}", e);
        }
    }
}

#[async_trait]
impl SessionListener for SettingsSync {
    async fn on_session_established(&self, _handle: &PeripheralHandle) -> Result<()> {
        self.read_all_settings().await.map(|_| ())
    }
}
