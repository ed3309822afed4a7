//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use shotstopper_core::{CachePolicy, SessionConfig};

use crate::cli::{ConfigKey, SessionArgs};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Advertised peripheral name to look for
    #[serde(default)]
    pub device_name: Option<String>,

    /// Scan window in seconds
    #[serde(default)]
    pub scan_seconds: Option<u64>,

    /// Settings cache database location
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// When the settings cache is written
    #[serde(default)]
    pub cache_policy: Option<CachePolicy>,

    /// Always use the simulated peripheral
    #[serde(default)]
    pub demo: bool,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shotstopper")
            .join("config.toml")
    }

    /// Load config from `path`, or return default if it is missing or unreadable
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Apply `config set`.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::DeviceName => {
                if value.trim().is_empty() {
                    bail!("device_name cannot be empty");
                }
                self.device_name = Some(value.trim().to_string());
            }
            ConfigKey::ScanSeconds => {
                let seconds: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid scan_seconds: {}", value))?;
                self.scan_seconds = Some(seconds);
            }
            ConfigKey::CachePath => self.cache_path = Some(PathBuf::from(value)),
            ConfigKey::CachePolicy => {
                self.cache_policy = Some(match value {
                    "write_through" | "write-through" => CachePolicy::WriteThrough,
                    "boot_only" | "boot-only" => CachePolicy::BootOnly,
                    other => bail!(
                        "Invalid cache_policy: {} (expected write_through or boot_only)",
                        other
                    ),
                });
            }
            ConfigKey::Demo => {
                self.demo = match value.to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => true,
                    "false" | "0" | "no" | "off" => false,
                    other => bail!("Invalid demo flag: {}", other),
                };
            }
        }
        Ok(())
    }

    /// Apply `config unset`.
    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::DeviceName => self.device_name = None,
            ConfigKey::ScanSeconds => self.scan_seconds = None,
            ConfigKey::CachePath => self.cache_path = None,
            ConfigKey::CachePolicy => self.cache_policy = None,
            ConfigKey::Demo => self.demo = false,
        }
    }
}

/// Effective options after merging flags over the config file.
#[derive(Debug, Clone)]
pub struct Options {
    pub session: SessionConfig,
    pub cache_path: PathBuf,
    pub demo: bool,
}

/// Merge command-line flags over the config file. Flags win.
pub fn resolve(args: &SessionArgs, demo: bool, config: &Config) -> Options {
    let mut session = SessionConfig::default();

    if let Some(name) = args.device_name.as_ref().or(config.device_name.as_ref()) {
        session = session.device_name(name.clone());
    }
    if let Some(seconds) = args.scan_seconds.or(config.scan_seconds) {
        session = session.scan_duration(Duration::from_secs(seconds));
    }
    let policy = if args.boot_only_cache {
        CachePolicy::BootOnly
    } else {
        config.cache_policy.unwrap_or_default()
    };
    session = session.cache_policy(policy);

    let cache_path = args
        .cache
        .clone()
        .or_else(|| config.cache_path.clone())
        .unwrap_or_else(shotstopper_store::default_db_path);

    Options {
        session,
        cache_path,
        demo: demo || config.demo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unparseable_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scan_seconds = \"soon\"").unwrap();
        assert_eq!(Config::load(&path), Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set(ConfigKey::DeviceName, "bench unit").unwrap();
        config.set(ConfigKey::CachePolicy, "boot-only").unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path);
        assert_eq!(loaded.device_name.as_deref(), Some("bench unit"));
        assert_eq!(loaded.cache_policy, Some(CachePolicy::BootOnly));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set(ConfigKey::ScanSeconds, "ten").is_err());
        assert!(config.set(ConfigKey::CachePolicy, "sometimes").is_err());
        assert!(config.set(ConfigKey::DeviceName, "  ").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unset_clears_key() {
        let mut config = Config::default();
        config.set(ConfigKey::Demo, "on").unwrap();
        assert!(config.demo);
        config.unset(ConfigKey::Demo);
        assert!(!config.demo);
    }

    #[test]
    fn test_flags_override_file() {
        let config = Config {
            device_name: Some("from file".into()),
            scan_seconds: Some(6),
            cache_policy: Some(CachePolicy::WriteThrough),
            ..Config::default()
        };
        let args = SessionArgs {
            device_name: Some("from flag".into()),
            scan_seconds: None,
            cache: Some(PathBuf::from("/tmp/cache.db")),
            boot_only_cache: true,
        };

        let options = resolve(&args, false, &config);
        assert_eq!(options.session.device_name, "from flag");
        assert_eq!(options.session.scan_duration, Duration::from_secs(6));
        assert_eq!(options.session.cache_policy, CachePolicy::BootOnly);
        assert_eq!(options.cache_path, PathBuf::from("/tmp/cache.db"));
        assert!(!options.demo);
    }

    #[test]
    fn test_demo_from_file() {
        let config = Config {
            demo: true,
            ..Config::default()
        };
        assert!(resolve(&SessionArgs::default(), false, &config).demo);
    }
}
