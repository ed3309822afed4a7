//! Command implementations.

mod cache;
mod config;
mod connect;
mod get;
mod reset;
mod set;
mod status;
mod watch;

pub use cache::cmd_cache;
pub use config::cmd_config;
pub use connect::cmd_connect;
pub use get::cmd_get;
pub use reset::cmd_reset;
pub use set::cmd_set;
pub use status::cmd_status;
pub use watch::{WatchArgs, cmd_watch};
