//! Graph change events.

use serde::{Deserialize, Serialize};

use crate::graph::{Link, LinkState, Node, Port};

/// Events emitted by the graph monitors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "data")]
pub enum GraphEvent {
    /// PipeWire answered again (or for the first time)
    Connected,
    /// PipeWire stopped answering
    Disconnected { reason: String },
    /// A node was added to the graph
    NodeAdded(Node),
    /// A node's properties changed (e.g. the media title)
    NodeChanged(Node),
    /// A node was removed from the graph
    NodeRemoved { id: u32, name: String },
    /// A port was added
    PortAdded(Port),
    /// A port was removed
    PortRemoved { id: u32 },
    /// A link was created
    LinkAdded(Link),
    /// A link changed state
    LinkStateChanged { id: u32, state: LinkState },
    /// A link was removed
    LinkRemoved { id: u32 },
    /// An object of unknown kind was removed (registry removals carry no type)
    ObjectRemoved { id: u32 },
}

impl GraphEvent {
    /// Whether this event changes the graph contents.
    #[must_use]
    pub fn is_graph_change(&self) -> bool {
        !matches!(self, Self::Connected | Self::Disconnected { .. })
    }
}
