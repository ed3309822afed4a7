//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use shotstopper_types::uuid::DEVICE_NAME;

use crate::error::{Error, Result};
use crate::platform::PlatformConfig;
use crate::retry::RetryConfig;
use crate::scan::ScanMode;

/// Shortest scan window accepted.
pub const MIN_SCAN_DURATION: Duration = Duration::from_secs(5);

/// Longest scan window accepted.
pub const MAX_SCAN_DURATION: Duration = Duration::from_secs(10);

/// When the local settings cache is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Save after every confirmed write and every bulk read.
    #[default]
    WriteThrough,
    /// Only read the cache at startup; never write it.
    BootOnly,
}

/// Configuration for a [`Session`](crate::session::Session) and its sync engine.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Advertised local name of the peripheral.
    pub device_name: String,
    /// How long a scan runs before giving up.
    pub scan_duration: Duration,
    pub scan_mode: ScanMode,
    pub connect_timeout: Duration,
    pub discovery_timeout: Duration,
    /// Timeout for a single read attempt.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub read_retry: RetryConfig,
    pub cache_policy: CachePolicy,
    pub platform: PlatformConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::for_platform(PlatformConfig::for_current_platform())
    }
}

impl SessionConfig {
    /// Defaults tuned for `platform`.
    pub fn for_platform(platform: PlatformConfig) -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            scan_duration: platform
                .recommended_scan_duration
                .clamp(MIN_SCAN_DURATION, MAX_SCAN_DURATION),
            scan_mode: ScanMode::LowLatency,
            connect_timeout: platform.recommended_connection_timeout,
            discovery_timeout: platform.recommended_connection_timeout,
            read_timeout: platform.recommended_operation_timeout,
            write_timeout: platform.recommended_operation_timeout,
            read_retry: RetryConfig::for_read(),
            cache_policy: CachePolicy::default(),
            platform,
        }
    }

    /// Set the expected device name.
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the scan window, clamped to 5-10 s.
    #[must_use]
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration.clamp(MIN_SCAN_DURATION, MAX_SCAN_DURATION);
        self
    }

    #[must_use]
    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = mode;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_retry(mut self, retry: RetryConfig) -> Self {
        self.read_retry = retry;
        self
    }

    #[must_use]
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Whether an already-connected peripheral named `name` is ours.
    ///
    /// Accepts the exact configured name or anything containing "shot",
    /// case-insensitively.
    pub fn matches_name(&self, name: &str) -> bool {
        name == self.device_name || name.to_lowercase().contains("shot")
    }

    /// Check the configuration for values the session cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.trim().is_empty() {
            return Err(Error::invalid_config("device name must not be empty"));
        }
        if !(MIN_SCAN_DURATION..=MAX_SCAN_DURATION).contains(&self.scan_duration) {
            return Err(Error::invalid_config(format!(
                "scan duration {:?} outside {:?}..={:?}",
                self.scan_duration, MIN_SCAN_DURATION, MAX_SCAN_DURATION
            )));
        }
        for (name, timeout) in [
            ("connect", self.connect_timeout),
            ("discovery", self.discovery_timeout),
            ("read", self.read_timeout),
            ("write", self.write_timeout),
        ] {
            if timeout.is_zero() {
                return Err(Error::invalid_config(format!(
                    "{} timeout must be non-zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::for_platform(PlatformConfig::android(33));
        assert_eq!(config.device_name, "shotStopper");
        assert_eq!(config.scan_duration, Duration::from_secs(10));
        assert_eq!(config.scan_mode, ScanMode::LowLatency);
        assert_eq!(config.read_retry.total_attempts(), 3);
        assert_eq!(config.cache_policy, CachePolicy::WriteThrough);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_duration_is_clamped() {
        let config = SessionConfig::default().scan_duration(Duration::from_secs(60));
        assert_eq!(config.scan_duration, MAX_SCAN_DURATION);
        let config = SessionConfig::default().scan_duration(Duration::from_secs(1));
        assert_eq!(config.scan_duration, MIN_SCAN_DURATION);
    }

    #[test]
    fn test_matches_name() {
        let config = SessionConfig::default();
        assert!(config.matches_name("shotStopper"));
        assert!(config.matches_name("SHOTSTOPPER-2"));
        assert!(config.matches_name("my shot timer"));
        assert!(!config.matches_name("Decent Scale 1A2B"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SessionConfig::default().device_name("  ");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = SessionConfig::default();
        config.scan_duration = Duration::from_secs(30);
        assert!(config.validate().is_err());

        let config = SessionConfig::default().write_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
