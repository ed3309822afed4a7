//! Watch command implementation.
//!
//! Holds one session open and prints every session event until interrupted.
//! In demo mode a background task flips the simulated scale link so there
//! is something to see.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use shotstopper_core::{DEMO_PERIPHERAL_ID, MockTransport, PeripheralId};
use shotstopper_types::{ScaleStatus, Setting, SettingValue};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::cli::OutputFormat;
use crate::config::Options;
use crate::format::{format_event_json, format_event_text, format_snapshot_text};
use crate::style;
use crate::util;

/// How often the demo scale link toggles.
const DEMO_SCALE_PERIOD: Duration = Duration::from_secs(5);

pub struct WatchArgs<'a> {
    pub options: &'a Options,
    /// Zero runs until interrupted.
    pub duration: u64,
    pub format: OutputFormat,
    pub quiet: bool,
}

fn spawn_demo_scale(mock: Arc<MockTransport>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let id = PeripheralId::new(DEMO_PERIPHERAL_ID);
        let mut status = ScaleStatus::Disconnected;
        loop {
            tokio::time::sleep(DEMO_SCALE_PERIOD).await;
            status = match status {
                ScaleStatus::Connected => ScaleStatus::Disconnected,
                ScaleStatus::Disconnected => ScaleStatus::Connected,
            };
            mock.notify(
                &id,
                Setting::ScaleStatus,
                SettingValue::Status(status).encode().to_vec(),
            );
        }
    })
}

pub async fn cmd_watch(args: WatchArgs<'_>) -> Result<()> {
    let WatchArgs {
        options,
        duration,
        format,
        quiet,
    } = args;

    let runtime = util::start(options).await?;
    let handle = runtime.handle();

    if let Err(e) = util::connect(&handle, &options.session.device_name, quiet).await {
        runtime.context.shutdown().await;
        return Err(e);
    }

    let color = style::use_color();
    if format == OutputFormat::Text {
        println!("{}", format_snapshot_text(&runtime.context.snapshot(), color));
        if !quiet {
            eprintln!("{}", style::dim("Watching for changes (Ctrl+C to stop)", color));
        }
    }

    let mut events = runtime.context.events();
    let demo_task = runtime.demo.clone().map(spawn_demo_scale);
    let deadline =
        (duration > 0).then(|| tokio::time::Instant::now() + Duration::from_secs(duration));

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => break,
            event = events.recv() => event,
        };

        match event {
            Ok(event) => match format {
                OutputFormat::Text => {
                    if let Some(line) = format_event_text(&event) {
                        println!("{}", line);
                    }
                }
                OutputFormat::Json => match format_event_json(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("Failed to serialize event: {}", e),
                },
            },
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!("Skipped {} events", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }

    if let Some(task) = demo_task {
        task.abort();
    }
    runtime.context.shutdown().await;
    Ok(())
}
