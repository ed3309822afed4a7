//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use shotstopper_types::Setting;

#[derive(Parser, Debug)]
#[command(name = "shotstopper")]
#[command(author, version, about = "Companion CLI for the shotStopper flow controller", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Talk to a simulated peripheral instead of the radio
    #[arg(long, global = true, env = "SHOTSTOPPER_DEMO")]
    pub demo: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "SHOTSTOPPER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub session: SessionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that opens a session.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Advertised name of the peripheral
    #[arg(long, global = true, env = "SHOTSTOPPER_DEVICE")]
    pub device_name: Option<String>,

    /// Scan window in seconds (5-10)
    #[arg(long, global = true)]
    pub scan_seconds: Option<u64>,

    /// Settings cache database
    #[arg(long, global = true, env = "SHOTSTOPPER_CACHE")]
    pub cache: Option<PathBuf>,

    /// Only read the cache at startup; never write it
    #[arg(long, global = true)]
    pub boot_only_cache: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show cached settings and radio state without connecting
    Status {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Connect, read every setting and print them
    Connect {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Read one setting from the peripheral
    Get {
        /// Setting name (e.g. dripDelay, drip-delay, weight)
        setting: Setting,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Write one setting to the peripheral
    Set {
        /// Setting name (e.g. autoTare, max-shot-duration)
        setting: Setting,

        /// New value: on/off for flags, a number for byte settings
        value: String,
    },

    /// Restore factory defaults on the peripheral
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Stay connected and print changes as they happen
    Watch {
        /// Stop after this many seconds (0 runs until Ctrl+C)
        #[arg(short, long, default_value_t = 0)]
        duration: u64,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Inspect or clear the local settings cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or edit the CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Print the cached settings record
    Show {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Delete the cached settings record
    Clear,
    /// Print the cache database location
    Path,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
    /// Set a configuration key
    Set {
        #[arg(value_enum)]
        key: ConfigKey,
        value: String,
    },
    /// Remove a configuration key
    Unset {
        #[arg(value_enum)]
        key: ConfigKey,
    },
}

/// Keys accepted by `config set` and `config unset`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DeviceName,
    ScanSeconds,
    CachePath,
    CachePolicy,
    Demo,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
