//! Utility functions for shotstopper-core.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Run `fut` with a deadline, mapping expiry to [`Error::Timeout`].
pub(crate) async fn timed<T>(
    operation: &str,
    duration: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| Error::timeout(operation, duration))?
}

/// Format a btleplug peripheral ID as a plain string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they are
/// usually MAC addresses. The `Debug` form wraps either in
/// `PeripheralId(...)`, which is stripped here.
pub fn format_peripheral_id(id: &impl std::fmt::Debug) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}
