//! Connect command implementation.

use anyhow::Result;

use crate::cli::OutputFormat;
use crate::config::Options;
use crate::format::{format_snapshot_json, format_snapshot_text};
use crate::style;
use crate::util;

pub async fn cmd_connect(options: &Options, format: OutputFormat, quiet: bool) -> Result<()> {
    let runtime = util::start(options).await?;
    let handle = runtime.handle();

    let result = util::connect(&handle, &options.session.device_name, quiet).await;
    let snapshot = runtime.context.snapshot();
    runtime.context.shutdown().await;
    let peripheral = result?;

    let color = style::use_color();
    match format {
        OutputFormat::Text => {
            if !quiet {
                let name = peripheral.name.as_deref().unwrap_or("unnamed peripheral");
                eprintln!(
                    "{}",
                    style::success(&format!("Connected to {} ({})", name, peripheral.id), color)
                );
            }
            println!("{}", format_snapshot_text(&snapshot, color));
        }
        OutputFormat::Json => println!("{}", format_snapshot_json(&snapshot)?),
    }
    Ok(())
}
