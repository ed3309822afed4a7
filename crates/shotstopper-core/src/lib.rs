//! Connection and settings synchronization for the shotStopper peripheral.
//!
//! shotStopper is an espresso flow-control unit that stops a shot at a
//! target weight. This crate keeps one wireless session to it alive and
//! keeps its parameters consistent between memory, the peripheral and a
//! local cache.
//!
//! # Features
//!
//! - **Discovery**: scan for either accepted service layout, or reuse a link the platform already holds
//! - **Single-flight connects**: overlapping connect calls collapse into one attempt
//! - **Settings sync**: retried reads, write-after-confirm updates with rollback, a gated bulk sweep
//! - **Lifecycle handling**: radio and foreground/background transitions drive reconnects
//! - **Published state**: one watchable [`Snapshot`] per [`SessionContext`]
//! - **Demo mode**: [`MockTransport::demo`] simulates a peripheral
//!
//! # Layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`permission`] | Permission gate run before any scan |
//! | [`monitor`] | Radio and app lifecycle transitions |
//! | [`session`] | Discovery, binding and the connect latch |
//! | [`sync`] | Per-setting reads and writes, sweep, reset |
//! | [`context`] | The published state surface |
//! | [`btle`], [`mock`] | [`Transport`] implementations |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use shotstopper_core::{BtleTransport, SessionContext, StoreCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = SessionContext::builder(Arc::new(BtleTransport::new().await?))
//!         .cache(Arc::new(StoreCache::open_default()?))
//!         .start()
//!         .await?;
//!
//!     let handle = context.handle();
//!     handle.connect_and_wait().await?;
//!     println!("{:?}", handle.snapshot()?.settings);
//!
//!     context.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod mock;
pub mod monitor;
pub mod permission;
pub mod platform;
pub mod retry;
pub mod scan;
pub mod session;
pub mod state;
pub mod sync;
pub mod traits;
pub mod util;

// Core exports
pub use btle::BtleTransport;
pub use cache::{MemoryCache, StoreCache};
pub use config::{CachePolicy, SessionConfig};
pub use context::{ContextHandle, SessionContext, SessionContextBuilder};
pub use error::{DeviceNotFoundReason, Error, ErrorKind, Result};
pub use events::{DisconnectReason, EventDispatcher, EventReceiver, SessionEvent, TransportEvent};
pub use mock::{DEMO_PERIPHERAL_ID, MockPeripheral, MockPermissions, MockStats, MockTransport};
pub use monitor::{AdapterMonitor, AppState, Transition};
pub use permission::{Permission, PermissionGate, PermissionStatus, PlatformPermissions};
pub use platform::{Platform, PlatformConfig};
pub use retry::{RetryConfig, with_retry};
pub use scan::{PeripheralId, PeripheralInfo, ScanFilter, ScanMode};
pub use session::{ConnectOutcome, PeripheralHandle, Session, SessionListener};
pub use state::{ConnectionState, RadioState, Snapshot, StateHub};
pub use sync::SettingsSync;
pub use traits::{PermissionProvider, SettingsCache, Transport};
pub use util::format_peripheral_id;

// Re-export from shotstopper-types
pub use shotstopper_types::uuid as uuids;
pub use shotstopper_types::{
    AddressingScheme, DeviceSettings, ScaleStatus, Setting, SettingKind, SettingValue,
};
