//! Session setup shared by the commands.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use shotstopper_core::{
    BtleTransport, ConnectOutcome, ContextHandle, MemoryCache, MockTransport, PeripheralHandle,
    SessionContext, SettingsCache, StoreCache, Transport,
};

use crate::config::Options;
use crate::style;

/// A started session plus the simulated transport when in demo mode.
pub struct Runtime {
    pub context: SessionContext,
    pub demo: Option<Arc<MockTransport>>,
}

impl Runtime {
    pub fn handle(&self) -> ContextHandle {
        self.context.handle()
    }
}

/// Start a session over the radio, or over [`MockTransport::demo`].
///
/// Demo sessions use an in-memory cache so the real cache is never touched.
pub async fn start(options: &Options) -> Result<Runtime> {
    let transport: Arc<dyn Transport>;
    let cache: Arc<dyn SettingsCache>;
    let mut demo = None;

    if options.demo {
        let mock = Arc::new(MockTransport::demo());
        transport = mock.clone();
        cache = Arc::new(MemoryCache::new());
        demo = Some(mock);
    } else {
        transport = Arc::new(
            BtleTransport::new()
                .await
                .context("Failed to open the Bluetooth adapter")?,
        );
        cache = Arc::new(StoreCache::open(&options.cache_path).with_context(|| {
            format!(
                "Failed to open settings cache: {}",
                options.cache_path.display()
            )
        })?);
    }

    let context = SessionContext::builder(transport)
        .config(options.session.clone())
        .cache(cache)
        .start()
        .await
        .context("Failed to start session")?;

    Ok(Runtime { context, demo })
}

/// Connect with a spinner and return the bound peripheral.
pub async fn connect(
    handle: &ContextHandle,
    device_name: &str,
    quiet: bool,
) -> Result<PeripheralHandle> {
    let spinner = style::spinner(format!("Looking for {}...", device_name), quiet);
    let outcome = handle.connect_and_wait().await;
    spinner.finish_and_clear();

    match outcome.with_context(|| format!("Could not connect to {}", device_name))? {
        ConnectOutcome::Connected(peripheral) | ConnectOutcome::AlreadyConnected(peripheral) => {
            Ok(peripheral)
        }
        ConnectOutcome::InProgress => bail!("Another connect attempt is already running"),
        ConnectOutcome::NotForeground => bail!("Session is backgrounded; not connecting"),
        ConnectOutcome::Cancelled => bail!("Connect attempt was cancelled"),
    }
}
