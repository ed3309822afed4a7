//! Platform-agnostic types for the shotStopper espresso flow-control peripheral.
//!
//! This crate holds what every other crate needs to talk about the
//! peripheral without touching Bluetooth:
//!
//! - The [`Setting`] catalogue and its single-byte wire encoding
//! - [`DeviceSettings`], the last-known parameter record
//! - UUID constants for both characteristic layouts
//! - Error types for decoding
//!
//! # Example
//!
//! ```
//! use shotstopper_types::{AddressingScheme, DeviceSettings, Setting, SettingValue};
//!
//! let mut settings = DeviceSettings::default();
//! settings.set(Setting::DripDelay, SettingValue::Int(5)).unwrap();
//! assert_eq!(settings.drip_delay, 5);
//!
//! let uuid = AddressingScheme::Legacy.characteristic(Setting::DripDelay);
//! assert_eq!(uuid.to_string(), "0000ff17-0000-1000-8000-00805f9b34fb");
//! ```

pub mod error;
pub mod settings;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use settings::{
    DeviceSettings, RESET_SEQUENCE, ScaleStatus, Setting, SettingKind, SettingValue,
    clamp_to_byte,
};
pub use uuid::AddressingScheme;
pub use uuid as uuids;
