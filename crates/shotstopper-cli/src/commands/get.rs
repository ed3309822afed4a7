//! Get command implementation.

use anyhow::{Context, Result};
use shotstopper_types::Setting;

use crate::cli::OutputFormat;
use crate::config::Options;
use crate::format::{format_value, format_value_json};
use crate::util;

pub async fn cmd_get(
    options: &Options,
    setting: Setting,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let runtime = util::start(options).await?;
    let handle = runtime.handle();

    let result: Result<_> = async {
        util::connect(&handle, &options.session.device_name, quiet).await?;
        handle
            .read(setting)
            .await
            .with_context(|| format!("Failed to read {}", setting))
    }
    .await;
    runtime.context.shutdown().await;
    let value = result?;

    match format {
        OutputFormat::Text => println!("{}", format_value(setting, value)),
        OutputFormat::Json => println!("{}", format_value_json(setting, value)?),
    }
    Ok(())
}
