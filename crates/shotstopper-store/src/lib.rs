//! Local settings cache for the shotStopper companion.
//!
//! The last settings read from (or written to) the peripheral are kept in
//! a small SQLite key-value table so they can be shown before a connection
//! is made. Values are JSON documents; the settings record lives under
//! [`SETTINGS_KEY`].
//!
//! # Example
//!
//! ```
//! use shotstopper_store::Store;
//! use shotstopper_types::DeviceSettings;
//!
//! let store = Store::open_in_memory()?;
//! store.save_settings(&DeviceSettings::default())?;
//! let cached = store.load_settings()?.unwrap();
//! assert_eq!(cached.settings.weight_value, 36);
//! # Ok::<(), shotstopper_store::Error>(())
//! ```

mod error;
mod schema;
mod store;

pub use error::{Error, Result};
pub use store::{CachedSettings, SETTINGS_KEY, Store, StoredEntry};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/shotstopper/cache.db`
/// - macOS: `~/Library/Application Support/shotstopper/cache.db`
/// - Windows: `C:\Users\<user>\AppData\Local\shotstopper\cache.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("shotstopper")
        .join("cache.db")
}
