//! Error types for shotstopper-core.
//!
//! Every failure a session can hit is an [`Error`]. Errors that end a
//! connect attempt are also published as a flat, copyable [`ErrorKind`] in
//! [`ConnectionState::last_error`](crate::state::ConnectionState::last_error)
//! so presentation code can show them without holding the full error.
//!
//! # Recovery
//!
//! | Error | Strategy |
//! |-------|----------|
//! | [`Error::PermissionDenied`] | Terminal for the attempt; ask the user |
//! | [`Error::RadioOff`] | Terminal; reconnect happens when the radio comes back |
//! | [`Error::DeviceNotBound`] | Do not retry; connect first |
//! | [`Error::DeviceNotFound`] | Terminal; the next foreground or radio-on event retries |
//! | [`Error::ReadFailed`] | Already retried; surface to the caller |
//! | [`Error::WriteFailed`] | Cached value rolled back and session torn down |
//! | [`Error::Timeout`] / [`Error::Bluetooth`] | Retried by [`crate::with_retry`] |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shotstopper_types::Setting;

use crate::permission::Permission;

/// Errors that can occur while talking to the peripheral.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// One or more platform permissions were not granted.
    #[error("Bluetooth permissions denied: {}", format_permissions(denied))]
    PermissionDenied {
        /// The permissions that were refused.
        denied: Vec<Permission>,
    },

    /// The wireless radio is off or unavailable.
    #[error("Bluetooth is turned off")]
    RadioOff,

    /// An operation needed a bound peripheral and none exists.
    #[error("No peripheral is bound")]
    DeviceNotBound,

    /// No matching peripheral was found.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// A read still failed after exhausting its retry budget.
    #[error("Failed to read {setting} after {attempts} attempts: {source}")]
    ReadFailed {
        /// The setting being read.
        setting: Setting,
        /// Total attempts made.
        attempts: u32,
        /// The last underlying error.
        #[source]
        source: Box<Error>,
    },

    /// A write was rejected or failed in transit.
    #[error("Failed to write {setting}: {reason}")]
    WriteFailed {
        /// The setting being written.
        setting: Setting,
        /// Why the write failed.
        reason: String,
    },

    /// The link dropped during an operation.
    #[error("Connection to peripheral lost")]
    ConnectionLost,

    /// Connecting or resolving services failed.
    #[error("Connection failed: {reason}")]
    ConnectFailed {
        /// Why the connection failed.
        reason: String,
    },

    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The peripheral returned data that could not be decoded.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A connect attempt was abandoned because the app left the foreground
    /// or the radio went off.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The published state surface was used after its provider was dropped.
    #[error("Session context is not available; it was used outside its provider")]
    ContextUnavailable,

    /// The local settings cache failed.
    #[error("Settings cache error: {0}")]
    Cache(#[from] shotstopper_store::Error),
}

fn format_permissions(permissions: &[Permission]) -> String {
    permissions
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reason why a device was not found.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Scan window elapsed without a matching advertisement.
    ScanTimeout { duration: Duration },
    /// A specific peripheral could not be resolved by the adapter.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScanTimeout { duration } => write!(f, "scan timed out after {:?}", duration),
            Self::NotFound { identifier } => write!(f, "peripheral '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

/// Flat error classification published in connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    RadioOff,
    DeviceNotBound,
    DeviceNotFound,
    ReadFailed,
    WriteFailed,
    ConnectionLost,
    /// Configuration, cache and context errors.
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::PermissionDenied => "permission denied",
            Self::RadioOff => "Bluetooth is off",
            Self::DeviceNotBound => "no device bound",
            Self::DeviceNotFound => "device not found",
            Self::ReadFailed => "read failed",
            Self::WriteFailed => "write failed",
            Self::ConnectionLost => "connection lost",
            Self::Other => "error",
        };
        f.write_str(text)
    }
}

impl Error {
    /// Classify this error for publication.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::RadioOff => ErrorKind::RadioOff,
            Self::DeviceNotBound => ErrorKind::DeviceNotBound,
            Self::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            Self::ReadFailed { .. } | Self::InvalidData(_) => ErrorKind::ReadFailed,
            Self::WriteFailed { .. } => ErrorKind::WriteFailed,
            Self::ConnectionLost
            | Self::ConnectFailed { .. }
            | Self::Bluetooth(_)
            | Self::Timeout { .. } => ErrorKind::ConnectionLost,
            Self::Cancelled
            | Self::InvalidConfig(_)
            | Self::ContextUnavailable
            | Self::Cache(_) => ErrorKind::Other,
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with a string reason.
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            reason: reason.into(),
        }
    }

    /// Create a write failure for `setting`.
    pub fn write_failed(setting: Setting, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            setting,
            reason: reason.into(),
        }
    }
}

impl From<shotstopper_types::ParseError> for Error {
    fn from(err: shotstopper_types::ParseError) -> Self {
        Error::InvalidData(err.to_string())
    }
}

/// Result type alias using shotstopper-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::RadioOff;
        assert_eq!(err.to_string(), "Bluetooth is turned off");

        let err = Error::write_failed(Setting::DripDelay, "gatt error");
        assert_eq!(err.to_string(), "Failed to write dripDelay: gatt error");

        let err = Error::timeout("read weightValue", Duration::from_secs(5));
        assert!(err.to_string().contains("read weightValue"));
        assert!(err.to_string().contains("5s"));

        let err = Error::PermissionDenied {
            denied: vec![Permission::BluetoothScan, Permission::BluetoothConnect],
        };
        assert!(err.to_string().contains("BLUETOOTH_SCAN, BLUETOOTH_CONNECT"));
    }

    #[test]
    fn test_read_failed_keeps_source() {
        let err = Error::ReadFailed {
            setting: Setting::FirmwareVersion,
            attempts: 3,
            source: Box::new(Error::ConnectionLost),
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(Error::RadioOff.kind(), ErrorKind::RadioOff);
        assert_eq!(Error::DeviceNotBound.kind(), ErrorKind::DeviceNotBound);
        assert_eq!(
            Error::DeviceNotFound(DeviceNotFoundReason::ScanTimeout {
                duration: Duration::from_secs(10)
            })
            .kind(),
            ErrorKind::DeviceNotFound
        );
        assert_eq!(
            Error::timeout("connect", Duration::from_secs(1)).kind(),
            ErrorKind::ConnectionLost
        );
        assert_eq!(Error::ContextUnavailable.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = shotstopper_types::ParseError::Empty("weightValue").into();
        assert!(matches!(err, Error::InvalidData(_)));
    }
}
