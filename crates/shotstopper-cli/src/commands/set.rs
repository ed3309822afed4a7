//! Set command implementation.

use anyhow::{Context, Result, bail};
use shotstopper_types::{Setting, SettingValue};

use crate::config::Options;
use crate::format::format_value;
use crate::style;
use crate::util;

/// Parse `raw` for `setting`, rejecting read-only settings.
fn parse_input(setting: Setting, raw: &str) -> Result<SettingValue> {
    if !setting.is_writable() {
        bail!("{} is read-only", setting);
    }
    Ok(setting.parse_value(raw)?)
}

/// Warning text when a byte value falls outside the device's usual range.
fn range_warning(setting: Setting, value: SettingValue) -> Option<String> {
    let range = setting.recommended_range()?;
    let v = match value {
        SettingValue::Int(v) => v,
        _ => return None,
    };
    let outside = !u8::try_from(v).is_ok_and(|b| range.contains(&b));
    outside.then(|| {
        format!(
            "{} = {} is outside the usual {}-{} range",
            setting,
            v,
            range.start(),
            range.end()
        )
    })
}

pub async fn cmd_set(options: &Options, setting: Setting, raw: &str, quiet: bool) -> Result<()> {
    let value = parse_input(setting, raw)?;
    let color = style::use_color();

    if let Some(warning) = range_warning(setting, value)
        && !quiet
    {
        eprintln!("{}", style::warning(&warning, color));
    }

    let runtime = util::start(options).await?;
    let handle = runtime.handle();

    let result: Result<_> = async {
        util::connect(&handle, &options.session.device_name, quiet).await?;
        let spinner = style::spinner(format!("Writing {}...", setting), quiet);
        let written = handle.update(setting, value).await;
        spinner.finish_and_clear();
        written.with_context(|| format!("Failed to write {}; previous value kept", setting))?;
        Ok(handle.snapshot()?.settings.get(setting))
    }
    .await;
    runtime.context.shutdown().await;
    let stored = result?;

    if !quiet {
        eprintln!(
            "{}",
            style::success(&format!("{} = {}", setting, format_value(setting, stored)), color)
        );
    }
    Ok(())
}
