//! IPC message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use soundstreamer_core::ledger::LinkPair;
use soundstreamer_core::state::DaemonState;

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// The method to invoke
    pub method: Method,
}

/// Response envelope sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    /// Result of the request
    pub result: Result<Value, ErrorInfo>,
}

impl Response {
    #[must_use]
    pub fn ok(id: u64, value: Value) -> Self {
        Self { id, result: Ok(value) }
    }

    #[must_use]
    pub fn err(id: u64, error: ErrorInfo) -> Self {
        Self { id, result: Err(error) }
    }
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Invalid or empty selection
    pub const BAD_REQUEST: i32 = 400;
    /// Unknown node, port or link
    pub const NOT_FOUND: i32 = 404;
    /// PipeWire refused the operation
    pub const INTERNAL: i32 = 500;
    /// PipeWire is not reachable
    pub const UNAVAILABLE: i32 = 503;

    /// Create a new error.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Self::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Self::NOT_FOUND, message)
    }
}

/// Methods that can be invoked via IPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    // State queries
    /// Get the current daemon state snapshot
    GetState,
    /// Get applications currently playing audio
    GetSources,
    /// Get microphones
    GetTargets,
    /// Get every link PipeWire reports
    GetLinks,
    /// Get links created during this session
    GetCreatedLinks,
    /// Get diagnostic information
    GetDiagnostics,

    // Graph control
    /// Re-read the graph from PipeWire
    Refresh,
    /// Link every selected source node to every selected target node
    CreateLinks { sources: Vec<u32>, targets: Vec<u32> },
    /// Link one output port to one input port
    LinkPorts { output_port: u32, input_port: u32 },
    /// Remove session-created links
    RemoveLinks { pairs: Vec<LinkPair> },
    /// Remove any link by its PipeWire ID
    UnlinkById { id: u32 },
    /// Remove every link created during this session
    RemoveAllLinks,

    // Subscriptions
    /// Subscribe to event types; an empty list subscribes to all
    Subscribe { events: Vec<String> },
    /// Unsubscribe from event types; an empty list unsubscribes from all
    Unsubscribe { events: Vec<String> },

    // System
    /// Request graceful shutdown
    Shutdown,
}

impl Method {
    /// Whether the method changes the graph or the session ledger.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Refresh
                | Self::CreateLinks { .. }
                | Self::LinkPorts { .. }
                | Self::RemoveLinks { .. }
                | Self::UnlinkById { .. }
                | Self::RemoveAllLinks
                | Self::Shutdown
        )
    }
}

/// A link request PipeWire refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFailure {
    pub pair: LinkPair,
    pub message: String,
}

/// Result of `CreateLinks` and `LinkPorts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReport {
    /// Pairs linked by this request
    pub created: Vec<LinkPair>,
    /// Pairs that were linked already
    pub already_linked: Vec<LinkPair>,
    /// Pairs PipeWire refused
    pub failed: Vec<LinkFailure>,
}

impl LinkReport {
    /// Status line shown to the user.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.created.is_empty() {
            "Failed to create audio links".to_string()
        } else {
            format!("Created {} audio links successfully", self.created.len())
        }
    }
}

/// Result of `RemoveLinks`, `UnlinkById` and `RemoveAllLinks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveReport {
    pub removed: Vec<LinkPair>,
    pub failed: Vec<LinkFailure>,
}

impl RemoveReport {
    /// Status line shown to the user.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.failed.is_empty() {
            format!("Removed {} audio links", self.removed.len())
        } else {
            format!(
                "Removed {} audio links, {} could not be removed",
                self.removed.len(),
                self.failed.len()
            )
        }
    }
}

/// Answer to `GetDiagnostics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub version: String,
    pub state: DaemonState,
    pub monitor: String,
    pub generation: u64,
    pub node_count: usize,
    pub port_count: usize,
    pub link_count: usize,
    pub created_links: usize,
    pub clients: usize,
    pub cleanup_on_exit: bool,
}
