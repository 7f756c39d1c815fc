//! SoundStreamer Core - Graph model, endpoint selection, and link bookkeeping.
//!
//! This crate contains the domain types shared between the PipeWire mirror,
//! the daemon, the IPC protocol and the command-line client.

pub mod command;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod graph;
pub mod ledger;
pub mod state;

pub use command::Command;
pub use endpoint::{AudioEndpoint, EndpointKind};
pub use error::{Error, Result};
pub use event::GraphEvent;
pub use graph::{GraphSnapshot, Link, LinkState, Node, Port, PortDirection};
pub use ledger::{LinkLedger, LinkPair, LinkScope};
pub use state::{DaemonState, StateSnapshot};
