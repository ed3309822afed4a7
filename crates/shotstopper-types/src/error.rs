//! Error types for data parsing in shotstopper-types.

use thiserror::Error;

/// Errors that can occur when decoding values read from the peripheral.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in shotstopper-core).
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The peripheral returned an empty value where one byte was expected.
    #[error("Empty value for {0}")]
    Empty(&'static str),

    /// A value had the wrong type for the setting it was applied to.
    #[error("Type mismatch for {setting}: expected {expected}")]
    TypeMismatch {
        /// The setting the value was applied to.
        setting: &'static str,
        /// The expected value type.
        expected: &'static str,
    },

    /// A setting name could not be recognized.
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    /// A textual value could not be parsed.
    #[error("Invalid value '{value}' for {setting}")]
    InvalidValue {
        /// The setting being parsed.
        setting: &'static str,
        /// The raw input.
        value: String,
    },
}

/// Result type alias using shotstopper-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
