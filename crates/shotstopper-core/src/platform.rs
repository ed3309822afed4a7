//! Per-platform tuning for the wireless stack.
//!
//! | Platform | Runtime grants | High-priority link | Scan / connect / op timeouts |
//! |----------|----------------|--------------------|------------------------------|
//! | Android  | yes (API 31+ scan/connect, older location) | yes | 10 s / 10 s / 5 s |
//! | iOS      | no (system prompt) | no | 10 s / 10 s / 5 s |
//! | macOS    | no | no | 10 s / 10 s / 8 s |
//! | Linux    | no | no | 8 s / 15 s / 10 s |
//! | Windows  | no | no | 8 s / 12 s / 10 s |

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// First Android API level with the split `BLUETOOTH_SCAN`/`BLUETOOTH_CONNECT` grants.
pub const ANDROID_SPLIT_PERMISSIONS_API: u32 = 31;

/// Host platform the session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android { api_level: u32 },
    Ios,
    MacOS,
    /// BlueZ.
    Linux,
    Windows,
    Unknown,
}

impl Platform {
    /// The platform this binary was built for.
    ///
    /// The Android API level is not visible from here; Android hosts should
    /// use [`PlatformConfig::android`].
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android {
                api_level: ANDROID_SPLIT_PERMISSIONS_API,
            }
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unknown
        }
    }
}

/// Timeouts and capabilities for one [`Platform`].
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub platform: Platform,
    pub recommended_scan_duration: Duration,
    pub recommended_connection_timeout: Duration,
    /// Per read or write.
    pub recommended_operation_timeout: Duration,
    /// Whether the stack accepts a high-priority connection parameter request.
    pub supports_connection_priority: bool,
}

impl PlatformConfig {
    pub fn for_current_platform() -> Self {
        Self::for_platform(Platform::current())
    }

    pub fn for_platform(platform: Platform) -> Self {
        let (scan, connect, operation) = match platform {
            Platform::Android { .. } | Platform::Ios => (10, 10, 5),
            Platform::MacOS => (10, 10, 8),
            Platform::Linux => (8, 15, 10),
            Platform::Windows => (8, 12, 10),
            Platform::Unknown => (10, 15, 10),
        };
        Self {
            platform,
            recommended_scan_duration: Duration::from_secs(scan),
            recommended_connection_timeout: Duration::from_secs(connect),
            recommended_operation_timeout: Duration::from_secs(operation),
            supports_connection_priority: matches!(platform, Platform::Android { .. }),
        }
    }

    pub fn android(api_level: u32) -> Self {
        Self::for_platform(Platform::Android { api_level })
    }

    pub fn linux() -> Self {
        Self::for_platform(Platform::Linux)
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::for_platform(Platform::Unknown)
    }
}
