//! IPC event types (server to client).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use soundstreamer_core::ledger::LinkPair;
use soundstreamer_core::state::DaemonState;

use crate::messages::LinkFailure;

/// Event sent from daemon to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub event: EventType,
    /// Event data
    pub data: Value,
}

impl Event {
    /// Build an event from any serializable payload.
    #[must_use]
    pub fn new(event: EventType, data: &impl Serialize) -> Self {
        Self { event, data: serde_json::to_value(data).unwrap_or(Value::Null) }
    }
}

/// Types of events that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Daemon state changed
    StateChanged,
    /// Nodes, ports or links appeared, changed or vanished
    GraphChanged,
    /// Links were created by a client
    LinksCreated,
    /// Session links were removed
    LinksRemoved,
    /// PipeWire answers again
    PipewireConnected,
    /// PipeWire stopped answering
    PipewireDisconnected,
    /// Error occurred
    Error,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::StateChanged,
        Self::GraphChanged,
        Self::LinksCreated,
        Self::LinksRemoved,
        Self::PipewireConnected,
        Self::PipewireDisconnected,
        Self::Error,
    ];

    /// Parse the wire name of an event type (`"links_created"`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }
}

/// State changed event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedData {
    pub state: DaemonState,
}

/// Graph changed event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphChangedData {
    pub generation: u64,
    /// Number of graph events folded into this change
    pub changes: usize,
    pub sources: usize,
    pub targets: usize,
    pub links: usize,
}

/// Links created event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksCreatedData {
    pub created: Vec<LinkPair>,
    pub failed: Vec<LinkFailure>,
}

/// Links removed event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksRemovedData {
    pub removed: Vec<LinkPair>,
}

/// PipeWire disconnected event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectedData {
    pub reason: String,
}

/// Error event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,
    pub message: String,
    pub source: String,
}
