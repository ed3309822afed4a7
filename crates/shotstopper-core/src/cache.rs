//! [`SettingsCache`] implementations.

use std::path::Path;
use std::sync::Mutex;

use shotstopper_store::Store;
use shotstopper_types::DeviceSettings;

use crate::error::{Error, Result};
use crate::traits::SettingsCache;

/// Settings cache backed by the SQLite store.
pub struct StoreCache {
    store: Mutex<Store>,
}

impl StoreCache {
    pub fn new(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    /// Open the store at the platform default location.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Store::open_default()?))
    }

    fn with_store<T>(&self, f: impl FnOnce(&Store) -> shotstopper_store::Result<T>) -> Result<T> {
        // A panic while holding the lock leaves the connection usable.
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        f(&store).map_err(Error::from)
    }
}

impl std::fmt::Debug for StoreCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCache").finish_non_exhaustive()
    }
}

impl SettingsCache for StoreCache {
    fn load(&self) -> Result<Option<DeviceSettings>> {
        self.with_store(|s| s.load_settings())
            .map(|cached| cached.map(|c| c.settings))
    }

    fn save(&self, settings: &DeviceSettings) -> Result<()> {
        self.with_store(|s| s.save_settings(settings))
    }
}

/// Process-local cache, mainly for tests and demo mode.
#[derive(Debug, Default)]
pub struct MemoryCache {
    settings: Mutex<Option<DeviceSettings>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache pre-seeded with `settings`.
    pub fn with_settings(settings: DeviceSettings) -> Self {
        Self {
            settings: Mutex::new(Some(settings)),
        }
    }
}

impl SettingsCache for MemoryCache {
    fn load(&self) -> Result<Option<DeviceSettings>> {
        Ok(*self.settings.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save(&self, settings: &DeviceSettings) -> Result<()> {
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = Some(*settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_cache_roundtrip() {
        let cache = StoreCache::new(Store::open_in_memory().unwrap());
        assert!(cache.load().unwrap().is_none());

        let settings = DeviceSettings {
            drip_delay: 5,
            ..Default::default()
        };
        cache.save(&settings).unwrap();
        assert_eq!(cache.load().unwrap(), Some(settings));
    }

    #[test]
    fn test_store_cache_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        StoreCache::open(&path)
            .unwrap()
            .save(&DeviceSettings::default())
            .unwrap();

        let reopened = StoreCache::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(DeviceSettings::default()));
    }

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        assert!(cache.load().unwrap().is_none());
        cache.save(&DeviceSettings::default()).unwrap();
        assert!(cache.load().unwrap().is_some());
    }
}
