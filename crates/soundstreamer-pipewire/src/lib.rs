//! SoundStreamer PipeWire - the graph mirror and link control.
//!
//! This crate handles all interactions with PipeWire, including:
//! - Reading the graph with `pw-dump`
//! - Creating and removing links with `pw-link`
//! - Tracking the links created during a session
//! - Monitoring the audio graph for changes

pub mod cli;
pub mod diff;
pub mod dump;
pub mod error;
pub mod mirror;
pub mod monitor;
#[cfg(feature = "native")]
pub mod native;
pub mod reconcile;
pub mod tools;

pub use cli::{GraphBackend, PwCli, ToolPaths};
#[cfg(any(test, feature = "mock"))]
pub use cli::MockGraphBackend;
pub use error::{PwError, PwResult};
pub use mirror::{CleanupReport, GraphMirror, LinkOutcome};
pub use monitor::{GraphEvent, MonitorHandle, PollingMonitor, spawn_monitor};
#[cfg(feature = "native")]
pub use native::NativeMonitor;
pub use reconcile::{ReconcileAction, Reconciler};
pub use tools::{ensure_tools, missing_tools};
