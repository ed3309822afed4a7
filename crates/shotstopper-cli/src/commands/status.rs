//! Status command implementation.

use anyhow::Result;

use crate::cli::OutputFormat;
use crate::config::Options;
use crate::format::{format_snapshot_json, format_snapshot_text};
use crate::style;
use crate::util;

/// Print the published snapshot as seeded from the cache. Never connects.
pub async fn cmd_status(options: &Options, format: OutputFormat) -> Result<()> {
    let runtime = util::start(options).await?;
    let snapshot = runtime.context.snapshot();
    runtime.context.shutdown().await;

    let output = match format {
        OutputFormat::Text => format_snapshot_text(&snapshot, style::use_color()),
        OutputFormat::Json => format_snapshot_json(&snapshot)?,
    };
    println!("{}", output);
    Ok(())
}
