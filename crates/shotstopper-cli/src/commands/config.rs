//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::style;

pub fn cmd_config(path: &Path, action: ConfigAction, quiet: bool) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => {
            let config = Config::load(path);
            let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            if !quiet {
                eprintln!("{}", style::dim(&format!("# {}", path.display()), style::use_color()));
            }
            print!("{}", content);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(path);
            config.set(key, &value)?;
            config.save(path)?;
            if !quiet {
                eprintln!("{}", style::success("Configuration saved", style::use_color()));
            }
        }
        ConfigAction::Unset { key } => {
            let mut config = Config::load(path);
            config.unset(key);
            config.save(path)?;
            if !quiet {
                eprintln!("{}", style::success("Configuration saved", style::use_color()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConfigKey;

    #[test]
    fn test_set_then_unset_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        cmd_config(
            &path,
            ConfigAction::Set {
                key: ConfigKey::ScanSeconds,
                value: "8".into(),
            },
            true,
        )
        .unwrap();
        assert_eq!(Config::load(&path).scan_seconds, Some(8));

        cmd_config(
            &path,
            ConfigAction::Unset {
                key: ConfigKey::ScanSeconds,
            },
            true,
        )
        .unwrap();
        assert_eq!(Config::load(&path).scan_seconds, None);
    }

    #[test]
    fn test_invalid_value_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let result = cmd_config(
            &path,
            ConfigAction::Set {
                key: ConfigKey::CachePolicy,
                value: "never".into(),
            },
            true,
        );
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
