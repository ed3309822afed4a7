mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{
    WatchArgs, cmd_cache, cmd_config, cmd_connect, cmd_get, cmd_reset, cmd_set, cmd_status,
    cmd_watch,
};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output on stdout stays clean.
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let file = Config::load(&config_path);
    let options = config::resolve(&cli.session, cli.demo, &file);
    if options.demo {
        tracing::info!("Using the simulated shotStopper");
    }

    let quiet = cli.quiet;
    match cli.command {
        Commands::Status { format } => cmd_status(&options, format).await?,
        Commands::Connect { format } => cmd_connect(&options, format, quiet).await?,
        Commands::Get { setting, format } => cmd_get(&options, setting, format, quiet).await?,
        Commands::Set { setting, value } => cmd_set(&options, setting, &value, quiet).await?,
        Commands::Reset { force } => cmd_reset(&options, force, quiet).await?,
        Commands::Watch { duration, format } => {
            cmd_watch(WatchArgs {
                options: &options,
                duration,
                format,
                quiet,
            })
            .await?
        }
        Commands::Cache { action } => cmd_cache(&options.cache_path, action, quiet)?,
        Commands::Config { action } => cmd_config(&config_path, action, quiet)?,
    }

    Ok(())
}
