//! PipeWire graph model.
//!
//! A [`GraphSnapshot`] is an immutable picture of the nodes, ports and links
//! PipeWire reported at one point in time. The mirror replaces it wholesale on
//! every refresh, or folds single [`GraphEvent`]s into it when a live registry
//! monitor is in use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::event::GraphEvent;

/// Information about a PipeWire node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// PipeWire object ID
    pub id: u32,
    /// Node name (`node.name`)
    pub name: String,
    /// Node description
    pub description: Option<String>,
    /// Media class (Stream/Output/Audio, Audio/Source, etc.)
    pub media_class: Option<String>,
    /// Application name (for client nodes)
    pub application_name: Option<String>,
    /// Media title currently played by the client
    pub media_name: Option<String>,
    /// Binary name (for client nodes)
    pub binary_name: Option<String>,
    /// Process ID
    pub pid: Option<u32>,
    /// All node properties
    pub properties: BTreeMap<String, String>,
}

/// Which side of the graph a node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeDirection {
    /// Produces audio
    Source,
    /// Consumes audio
    Sink,
}

impl Node {
    /// Build a node from its flat property dictionary.
    #[must_use]
    pub fn from_props(id: u32, properties: BTreeMap<String, String>) -> Self {
        let get = |key: &str| properties.get(key).cloned();

        Self {
            id,
            name: get("node.name").unwrap_or_else(|| "unknown".to_string()),
            description: get("node.description"),
            media_class: get("media.class"),
            application_name: get("application.name"),
            media_name: get("media.name"),
            binary_name: get("application.process.binary"),
            pid: properties.get("application.process.id").and_then(|s| s.parse().ok()),
            properties,
        }
    }

    /// Direction derived from the media class.
    #[must_use]
    pub fn direction(&self) -> Option<NodeDirection> {
        let class = self.media_class.as_deref()?;
        if class.contains("Source") || class.contains("Output") {
            Some(NodeDirection::Source)
        } else if class.contains("Sink") || class.contains("Input") {
            Some(NodeDirection::Sink)
        } else {
            None
        }
    }

    /// Check if this is an application stream playing audio.
    #[must_use]
    pub fn is_app_stream(&self) -> bool {
        self.media_class.as_ref().is_some_and(|c| c.contains("Stream/Output/Audio"))
    }

    /// Check if this is a microphone (audio source device or virtual source).
    #[must_use]
    pub fn is_microphone(&self) -> bool {
        self.media_class.as_ref().is_some_and(|c| c.contains("Audio/Source"))
    }

    /// Name of the process behind this node, as shown in link labels.
    #[must_use]
    pub fn process_name(&self) -> String {
        self.application_name
            .clone()
            .or_else(|| self.properties.get("node.name").cloned())
            .unwrap_or_else(|| format!("Unknown Node ({})", self.id))
    }
}

/// Port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Input port (receives audio)
    Input,
    /// Output port (sends audio)
    Output,
}

impl PortDirection {
    /// Parse the short (`in`/`out`) or long (`input`/`output`) spelling.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in" | "input" => Some(Self::Input),
            "out" | "output" => Some(Self::Output),
            _ => None,
        }
    }
}

/// Information about a PipeWire port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// PipeWire object ID
    pub id: u32,
    /// Owning node ID
    pub node_id: u32,
    /// Port name
    pub name: String,
    /// Port direction
    pub direction: PortDirection,
    /// Audio channel position (FL, FR, MONO...)
    pub channel: Option<String>,
    /// Port alias
    pub alias: Option<String>,
}

/// State of a PipeWire link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Link is being set up
    #[default]
    Init,
    /// Link is being negotiated
    Negotiating,
    /// Link is allocating buffers
    Allocating,
    /// Link is paused
    Paused,
    /// Link is active
    Active,
    /// Link encountered an error
    Error,
    /// Link is unlinked
    Unlinked,
}

impl LinkState {
    /// Parse the state string reported by `pw-dump`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "negotiating" => Self::Negotiating,
            "allocating" => Self::Allocating,
            "paused" => Self::Paused,
            "active" => Self::Active,
            "error" => Self::Error,
            "unlinked" => Self::Unlinked,
            _ => Self::Init,
        }
    }
}

/// Information about a PipeWire link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// PipeWire object ID
    pub id: u32,
    /// Output (source) node ID
    pub output_node: u32,
    /// Output port ID
    pub output_port: u32,
    /// Input (destination) node ID
    pub input_node: u32,
    /// Input port ID
    pub input_port: u32,
    /// Link state
    pub state: LinkState,
    /// Error reported by PipeWire, if any
    pub error: Option<String>,
}

/// Point-in-time view of the PipeWire graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    nodes: BTreeMap<u32, Node>,
    ports: BTreeMap<u32, Port>,
    links: BTreeMap<u32, Link>,
}

impl GraphSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from object lists.
    #[must_use]
    pub fn from_parts(
        nodes: impl IntoIterator<Item = Node>,
        ports: impl IntoIterator<Item = Port>,
        links: impl IntoIterator<Item = Link>,
    ) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
            ports: ports.into_iter().map(|p| (p.id, p)).collect(),
            links: links.into_iter().map(|l| (l.id, l)).collect(),
        }
    }

    /// Get a node by ID.
    #[must_use]
    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a port by ID.
    #[must_use]
    pub fn port(&self, id: u32) -> Option<&Port> {
        self.ports.get(&id)
    }

    /// Get a link by ID.
    #[must_use]
    pub fn link(&self, id: u32) -> Option<&Link> {
        self.links.get(&id)
    }

    /// All nodes, ordered by ID.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All ports, ordered by ID.
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// All links, ordered by ID.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Ports owned by a node.
    pub fn ports_for_node(&self, node_id: u32) -> impl Iterator<Item = &Port> {
        self.ports.values().filter(move |p| p.node_id == node_id)
    }

    /// Links involving a node (as source or destination).
    pub fn links_for_node(&self, node_id: u32) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.output_node == node_id || l.input_node == node_id)
    }

    /// Links going from one node to another.
    pub fn node_links(&self, output_node: u32, input_node: u32) -> impl Iterator<Item = &Link> {
        self.links
            .values()
            .filter(move |l| l.output_node == output_node && l.input_node == input_node)
    }

    /// Check if any link exists between two nodes.
    #[must_use]
    pub fn has_node_link(&self, output_node: u32, input_node: u32) -> bool {
        self.node_links(output_node, input_node).next().is_some()
    }

    /// Find the link between two ports.
    #[must_use]
    pub fn find_port_link(&self, output_port: u32, input_port: u32) -> Option<&Link> {
        self.links.values().find(|l| l.output_port == output_port && l.input_port == input_port)
    }

    /// Check if two ports are linked.
    #[must_use]
    pub fn has_port_link(&self, output_port: u32, input_port: u32) -> bool {
        self.find_port_link(output_port, input_port).is_some()
    }

    /// Fold a single graph event into the snapshot.
    ///
    /// Removals only drop the named object: PipeWire reports the removal of
    /// a node's ports and links as events of their own.
    pub fn apply(&mut self, event: &GraphEvent) {
        match event {
            GraphEvent::NodeAdded(node) | GraphEvent::NodeChanged(node) => {
                self.nodes.insert(node.id, node.clone());
            }
            GraphEvent::NodeRemoved { id, .. } => {
                self.nodes.remove(id);
            }
            GraphEvent::PortAdded(port) => {
                self.ports.insert(port.id, port.clone());
            }
            GraphEvent::PortRemoved { id } => {
                self.ports.remove(id);
            }
            GraphEvent::LinkAdded(link) => {
                self.links.insert(link.id, link.clone());
            }
            GraphEvent::LinkStateChanged { id, state } => {
                if let Some(link) = self.links.get_mut(id) {
                    link.state = *state;
                } else {
                    trace!(id, ?state, "State change for unknown link");
                }
            }
            GraphEvent::LinkRemoved { id } => {
                self.links.remove(id);
            }
            GraphEvent::ObjectRemoved { id } => {
                // Global ids are unique across object types
                self.nodes.remove(id);
                self.ports.remove(id);
                self.links.remove(id);
            }
            GraphEvent::Connected | GraphEvent::Disconnected { .. } => {}
        }
    }
}
