//! Device settings and their single-byte wire encoding.
//!
//! Every parameter the peripheral exposes is one unsigned byte:
//! booleans are `0x00`/`0x01`, integers are the raw value. Domain ranges
//! (e.g. a 1-15 s minimum shot) are a presentation concern and are only
//! offered here as hints via [`Setting::recommended_range`].

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// A named parameter on the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Setting {
    /// Target brew weight in grams.
    WeightValue,
    /// Brew state is determined by a reed switch on the solenoid.
    ReedSwitch,
    /// The brew switch is momentary rather than latching.
    Momentary,
    /// Tare the scale when a shot starts.
    AutoTare,
    /// Minimum shot duration in seconds.
    MinShotDuration,
    /// Maximum shot duration in seconds.
    MaxShotDuration,
    /// Seconds to keep weighing after the pump stops.
    DripDelay,
    /// Firmware version (read-only).
    FirmwareVersion,
    /// Whether the peripheral sees its scale (read-only, notified).
    ScaleStatus,
}

/// Wire type of a [`Setting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// `0x00` = false, `0x01` = true.
    Flag,
    /// Raw byte value, 0-255.
    Byte,
    /// Scale link status byte.
    Status,
}

impl Setting {
    /// Number of settings.
    pub const COUNT: usize = 9;

    /// All settings in wire-table order.
    pub const ALL: [Setting; Self::COUNT] = [
        Setting::WeightValue,
        Setting::ReedSwitch,
        Setting::Momentary,
        Setting::AutoTare,
        Setting::MinShotDuration,
        Setting::MaxShotDuration,
        Setting::DripDelay,
        Setting::FirmwareVersion,
        Setting::ScaleStatus,
    ];

    /// Settings only present on firmware that reports a non-zero version.
    pub const EXTENDED: [Setting; 6] = [
        Setting::AutoTare,
        Setting::Momentary,
        Setting::ReedSwitch,
        Setting::MinShotDuration,
        Setting::MaxShotDuration,
        Setting::DripDelay,
    ];

    /// Position of this setting in the addressing tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The camelCase name used in persisted records and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Setting::WeightValue => "weightValue",
            Setting::ReedSwitch => "reedSwitch",
            Setting::Momentary => "momentary",
            Setting::AutoTare => "autoTare",
            Setting::MinShotDuration => "minShotDuration",
            Setting::MaxShotDuration => "maxShotDuration",
            Setting::DripDelay => "dripDelay",
            Setting::FirmwareVersion => "firmwareVersion",
            Setting::ScaleStatus => "scaleStatus",
        }
    }

    /// Wire type of this setting.
    pub const fn kind(self) -> SettingKind {
        match self {
            Setting::ReedSwitch | Setting::Momentary | Setting::AutoTare => SettingKind::Flag,
            Setting::ScaleStatus => SettingKind::Status,
            _ => SettingKind::Byte,
        }
    }

    /// Whether the app may write this setting.
    pub const fn is_writable(self) -> bool {
        !matches!(self, Setting::FirmwareVersion | Setting::ScaleStatus)
    }

    /// Range the settings screen offers for this value, if it limits one.
    pub fn recommended_range(self) -> Option<RangeInclusive<u8>> {
        match self {
            Setting::MinShotDuration => Some(1..=15),
            Setting::MaxShotDuration => Some(30..=120),
            Setting::DripDelay => Some(1..=10),
            _ => None,
        }
    }

    /// Decode a value read from the peripheral.
    ///
    /// Only the first byte is significant; trailing bytes are ignored.
    pub fn decode(self, data: &[u8]) -> ParseResult<SettingValue> {
        let byte = *data.first().ok_or(ParseError::Empty(self.name()))?;
        Ok(match self.kind() {
            SettingKind::Flag => SettingValue::Bool(byte == 1),
            SettingKind::Byte => SettingValue::Int(i64::from(byte)),
            SettingKind::Status => SettingValue::Status(ScaleStatus::from(byte)),
        })
    }

    /// Parse a user-supplied textual value for this setting.
    pub fn parse_value(self, input: &str) -> ParseResult<SettingValue> {
        let invalid = || ParseError::InvalidValue {
            setting: self.name(),
            value: input.to_string(),
        };
        let input = input.trim();
        match self.kind() {
            SettingKind::Flag => match input.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Ok(SettingValue::Bool(true)),
                "0" | "false" | "off" | "no" => Ok(SettingValue::Bool(false)),
                _ => Err(invalid()),
            },
            SettingKind::Byte => {
                if let Ok(v) = input.parse::<i64>() {
                    Ok(SettingValue::Int(v))
                } else {
                    input
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .map(SettingValue::from_f64)
                        .ok_or_else(invalid)
                }
            }
            SettingKind::Status => match input.to_ascii_lowercase().as_str() {
                "connected" | "1" => Ok(SettingValue::Status(ScaleStatus::Connected)),
                "disconnected" | "0" => Ok(SettingValue::Status(ScaleStatus::Disconnected)),
                _ => Err(invalid()),
            },
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Setting {
    type Err = ParseError;

    /// Accepts camelCase, snake_case and kebab-case names, case-insensitively.
    fn from_str(s: &str) -> ParseResult<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        Setting::ALL
            .into_iter()
            .find(|setting| setting.name().to_ascii_lowercase() == normalized)
            .or(match normalized.as_str() {
                // The brew-weight screen calls it the timer value.
                "timervalue" | "weight" => Some(Setting::WeightValue),
                _ => None,
            })
            .ok_or_else(|| ParseError::UnknownSetting(s.to_string()))
    }
}

/// Scale link status reported by the peripheral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum ScaleStatus {
    /// No scale is paired with the peripheral.
    #[default]
    Disconnected = 0,
    /// A scale is paired and reporting.
    Connected = 1,
}

impl From<u8> for ScaleStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => ScaleStatus::Connected,
            _ => ScaleStatus::Disconnected,
        }
    }
}

impl fmt::Display for ScaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleStatus::Disconnected => write!(f, "disconnected"),
            ScaleStatus::Connected => write!(f, "connected"),
        }
    }
}

/// A typed value for a single [`Setting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SettingValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value; clamped to 0-255 when encoded.
    Int(i64),
    /// Scale link status.
    Status(ScaleStatus),
}

impl SettingValue {
    /// Build an integer value from a fractional input, flooring it first.
    pub fn from_f64(value: f64) -> Self {
        // `as` saturates, so out-of-range floats still clamp correctly below.
        SettingValue::Int(value.floor() as i64)
    }

    /// Encode as the single byte written to the peripheral.
    pub fn to_byte(self) -> u8 {
        match self {
            SettingValue::Bool(true) => 1,
            SettingValue::Bool(false) => 0,
            SettingValue::Int(v) => clamp_to_byte(v),
            SettingValue::Status(s) => s as u8,
        }
    }

    /// Encode as the write payload.
    pub fn encode(self) -> [u8; 1] {
        [self.to_byte()]
    }

    /// The boolean inside, if this is a flag.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The integer inside, clamped to a byte, if this is an integer.
    pub fn as_byte(self) -> Option<u8> {
        match self {
            SettingValue::Int(v) => Some(clamp_to_byte(v)),
            _ => None,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        SettingValue::Int(i64::from(value))
    }
}

impl From<u8> for SettingValue {
    fn from(value: u8) -> Self {
        SettingValue::Int(i64::from(value))
    }
}

impl From<ScaleStatus> for SettingValue {
    fn from(value: ScaleStatus) -> Self {
        SettingValue::Status(value)
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Int(v) => write!(f, "{}", v),
            SettingValue::Status(s) => write!(f, "{}", s),
        }
    }
}

/// Clamp an integer into the single-byte wire range.
pub fn clamp_to_byte(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

/// Last-known parameters of the peripheral.
///
/// This is also the record persisted to the local cache, using the
/// camelCase field names of the original settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct DeviceSettings {
    pub auto_tare: bool,
    pub momentary: bool,
    pub reed_switch: bool,
    /// Seconds.
    pub min_shot_duration: u8,
    /// Seconds.
    pub max_shot_duration: u8,
    /// Seconds.
    pub drip_delay: u8,
    /// Target brew weight.
    pub weight_value: u8,
    pub scale_status: ScaleStatus,
    pub firmware_version: u8,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            auto_tare: true,
            momentary: false,
            reed_switch: false,
            min_shot_duration: 3,
            max_shot_duration: 50,
            drip_delay: 3,
            weight_value: 36,
            scale_status: ScaleStatus::Disconnected,
            firmware_version: 0,
        }
    }
}

/// Values written by a reset, in write order.
pub const RESET_SEQUENCE: [(Setting, SettingValue); 7] = [
    (Setting::WeightValue, SettingValue::Int(36)),
    (Setting::AutoTare, SettingValue::Bool(true)),
    (Setting::Momentary, SettingValue::Bool(false)),
    (Setting::ReedSwitch, SettingValue::Bool(false)),
    (Setting::MinShotDuration, SettingValue::Int(3)),
    (Setting::MaxShotDuration, SettingValue::Int(50)),
    (Setting::DripDelay, SettingValue::Int(3)),
];

impl DeviceSettings {
    /// Current value of `setting`.
    pub fn get(&self, setting: Setting) -> SettingValue {
        match setting {
            Setting::WeightValue => SettingValue::Int(i64::from(self.weight_value)),
            Setting::ReedSwitch => SettingValue::Bool(self.reed_switch),
            Setting::Momentary => SettingValue::Bool(self.momentary),
            Setting::AutoTare => SettingValue::Bool(self.auto_tare),
            Setting::MinShotDuration => SettingValue::Int(i64::from(self.min_shot_duration)),
            Setting::MaxShotDuration => SettingValue::Int(i64::from(self.max_shot_duration)),
            Setting::DripDelay => SettingValue::Int(i64::from(self.drip_delay)),
            Setting::FirmwareVersion => SettingValue::Int(i64::from(self.firmware_version)),
            Setting::ScaleStatus => SettingValue::Status(self.scale_status),
        }
    }

    /// Store `value` into `setting`, clamping integers to a byte.
    pub fn set(&mut self, setting: Setting, value: SettingValue) -> ParseResult<()> {
        let mismatch = |expected| ParseError::TypeMismatch {
            setting: setting.name(),
            expected,
        };
        match (setting, value) {
            (Setting::ReedSwitch, SettingValue::Bool(b)) => self.reed_switch = b,
            (Setting::Momentary, SettingValue::Bool(b)) => self.momentary = b,
            (Setting::AutoTare, SettingValue::Bool(b)) => self.auto_tare = b,
            (Setting::WeightValue, SettingValue::Int(v)) => self.weight_value = clamp_to_byte(v),
            (Setting::MinShotDuration, SettingValue::Int(v)) => {
                self.min_shot_duration = clamp_to_byte(v)
            }
            (Setting::MaxShotDuration, SettingValue::Int(v)) => {
                self.max_shot_duration = clamp_to_byte(v)
            }
            (Setting::DripDelay, SettingValue::Int(v)) => self.drip_delay = clamp_to_byte(v),
            (Setting::FirmwareVersion, SettingValue::Int(v)) => {
                self.firmware_version = clamp_to_byte(v)
            }
            (Setting::ScaleStatus, SettingValue::Status(s)) => self.scale_status = s,
            _ => {
                return Err(mismatch(match setting.kind() {
                    SettingKind::Flag => "bool",
                    SettingKind::Byte => "integer",
                    SettingKind::Status => "scale status",
                }));
            }
        }
        Ok(())
    }

    /// Whether `value` would be encoded to the byte already held for `setting`.
    pub fn holds(&self, setting: Setting, value: SettingValue) -> bool {
        self.get(setting).to_byte() == value.to_byte()
    }

    /// Settings after a full reset, keeping the read-only fields.
    pub fn reset(&self) -> Self {
        let mut next = *self;
        for (setting, value) in RESET_SEQUENCE {
            // RESET_SEQUENCE only holds correctly typed values.
            let _ = next.set(setting, value);
        }
        next
    }
}
