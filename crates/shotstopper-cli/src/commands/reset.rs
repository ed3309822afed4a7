//! Reset command implementation.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result, bail};

use crate::config::Options;
use crate::format::format_settings_text;
use crate::style;
use crate::util;

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{} [y/N] ", prompt);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub async fn cmd_reset(options: &Options, force: bool, quiet: bool) -> Result<()> {
    if !force {
        if !io::stdin().is_terminal() {
            bail!("Refusing to reset without confirmation; pass --force");
        }
        if !confirm("Restore factory defaults on the shotStopper?")? {
            eprintln!("Aborted.");
            return Ok(());
        }
    }

    let runtime = util::start(options).await?;
    let handle = runtime.handle();

    let result: Result<_> = async {
        util::connect(&handle, &options.session.device_name, quiet).await?;
        let spinner = style::spinner("Restoring defaults...", quiet);
        let reset = handle.reset_to_defaults().await;
        spinner.finish_and_clear();
        reset.context("Reset did not complete; the link was dropped")?;
        Ok(handle.snapshot()?.settings)
    }
    .await;
    runtime.context.shutdown().await;
    let settings = result?;

    let color = style::use_color();
    if !quiet {
        eprintln!("{}", style::success("Defaults restored", color));
    }
    println!("{}", format_settings_text(&settings, color));
    Ok(())
}
