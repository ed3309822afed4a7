//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use shotstopper_types::DeviceSettings;

use crate::error::{Error, Result};
use crate::schema;

/// Key the settings record is stored under.
pub const SETTINGS_KEY: &str = "@device_settings";

/// A settings record loaded from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedSettings {
    pub settings: DeviceSettings,
    /// When the record was last written.
    pub saved_at: OffsetDateTime,
}

/// A raw key-value row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub value: String,
    pub updated_at: OffsetDateTime,
}

/// SQLite-based key-value store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening settings cache at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // === Settings ===

    /// Persist the full settings record, replacing any previous one.
    pub fn save_settings(&self, settings: &DeviceSettings) -> Result<()> {
        self.put_json(SETTINGS_KEY, settings)?;
        debug!("Saved settings record");
        Ok(())
    }

    /// Load the settings record, if one has been saved.
    ///
    /// A record that no longer parses is treated as absent and logged, so a
    /// corrupt cache never blocks startup.
    pub fn load_settings(&self) -> Result<Option<CachedSettings>> {
        let Some(entry) = self.get(SETTINGS_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<DeviceSettings>(&entry.value) {
            Ok(settings) => Ok(Some(CachedSettings {
                settings,
                saved_at: entry.updated_at,
            })),
            Err(e) => {
                warn!("Ignoring unreadable settings record: {}", e);
                Ok(None)
            }
        }
    }

    /// Remove the settings record. Returns whether one existed.
    pub fn clear_settings(&self) -> Result<bool> {
        self.delete(SETTINGS_KEY)
    }

    // === Raw key-value access ===

    /// Serialize `value` as JSON and store it under `key`.
    pub fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.put(key, &json)
    }

    /// Load and deserialize the JSON value under `key`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)?
            .map(|entry| serde_json::from_str(&entry.value).map_err(Error::from))
            .transpose()
    }

    /// Store a raw string under `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, now],
        )?;
        Ok(())
    }

    /// Fetch the raw entry under `key`.
    pub fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT key, value, updated_at FROM kv WHERE key = ?1",
                [key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(key, value, ts)| {
            Ok(StoredEntry {
                key,
                value,
                updated_at: timestamp(ts)?,
            })
        })
        .transpose()
    }

    /// Remove the entry under `key`. Returns whether one existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    /// List all entries ordered by key.
    pub fn entries(&self) -> Result<Vec<StoredEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, updated_at FROM kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (key, value, ts) = row?;
            entries.push(StoredEntry {
                key,
                value,
                updated_at: timestamp(ts)?,
            });
        }
        Ok(entries)
    }
}

fn timestamp(ts: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(ts).map_err(|_| Error::InvalidTimestamp(ts))
}
