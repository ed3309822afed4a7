//! Cache command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use shotstopper_store::Store;
use shotstopper_types::DeviceSettings;
use time::format_description::well_known::Rfc3339;

use crate::cli::{CacheAction, OutputFormat};
use crate::format::format_settings_text;
use crate::style;

fn open_store(path: &Path) -> Result<Store> {
    Store::open(path).with_context(|| format!("Failed to open cache: {}", path.display()))
}

pub fn cmd_cache(path: &Path, action: CacheAction, quiet: bool) -> Result<()> {
    match action {
        CacheAction::Path => println!("{}", path.display()),
        CacheAction::Show { format } => show(path, format)?,
        CacheAction::Clear => {
            if !path.exists() {
                if !quiet {
                    eprintln!("No cache at {}", path.display());
                }
                return Ok(());
            }
            let removed = open_store(path)?.clear_settings()?;
            if !quiet {
                let message = if removed {
                    "Cached settings cleared"
                } else {
                    "Nothing cached"
                };
                eprintln!("{}", style::success(message, style::use_color()));
            }
        }
    }
    Ok(())
}

fn show(path: &Path, format: OutputFormat) -> Result<()> {
    #[derive(Serialize)]
    struct CacheJson<'a> {
        path: &'a Path,
        saved_at: Option<String>,
        settings: Option<DeviceSettings>,
    }

    let cached = if path.exists() {
        open_store(path)?.load_settings()?
    } else {
        None
    };
    let saved_at = cached
        .map(|c| c.saved_at.format(&Rfc3339))
        .transpose()
        .context("Failed to format timestamp")?;

    match format {
        OutputFormat::Json => {
            let json = CacheJson {
                path,
                saved_at,
                settings: cached.map(|c| c.settings),
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => match (cached, saved_at) {
            (Some(cached), Some(saved_at)) => {
                let color = style::use_color();
                println!("{}", style::dim(&format!("Saved {}", saved_at), color));
                println!("{}", format_settings_text(&cached.settings, color));
            }
            _ => println!("No cached settings in {}", path.display()),
        },
    }
    Ok(())
}
