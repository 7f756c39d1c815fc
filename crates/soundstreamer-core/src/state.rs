//! Daemon state and the snapshot served to clients.

use serde::{Deserialize, Serialize};

use crate::endpoint::{self, AudioEndpoint};
use crate::graph::{GraphSnapshot, LinkState};
use crate::ledger::LinkPair;

/// Current state of the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    /// Checking tools and taking the first snapshot
    #[default]
    Initializing,
    /// Normal operation
    Running,
    /// PipeWire is not answering; the last snapshot is kept
    Disconnected,
    /// Removing session links before exit
    ShuttingDown,
    /// Fatal error state
    Error(String),
}

/// A link as reported by PipeWire, with a readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkView {
    /// PipeWire link ID
    pub id: u32,
    pub output_node: u32,
    pub output_port: u32,
    pub input_node: u32,
    pub input_port: u32,
    pub state: LinkState,
    /// `output → input` label
    pub label: String,
    /// Whether this session created the link
    pub created_here: bool,
}

/// A session-created link, with a readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedLinkView {
    pub pair: LinkPair,
    pub label: String,
    /// Whether PipeWire currently reports the link
    pub active: bool,
}

/// Complete snapshot of the daemon's current state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Current daemon state
    pub state: DaemonState,
    /// Applications playing audio
    pub sources: Vec<AudioEndpoint>,
    /// Microphones
    pub targets: Vec<AudioEndpoint>,
    /// Every link PipeWire reports
    pub links: Vec<LinkView>,
    /// Links created during this session
    pub created_links: Vec<CreatedLinkView>,
    pub node_count: usize,
    pub port_count: usize,
    pub link_count: usize,
    /// Number of successful refreshes so far
    pub generation: u64,
}

impl StateSnapshot {
    /// Build a snapshot from the mirrored graph and the session ledger.
    #[must_use]
    pub fn build(
        state: DaemonState,
        graph: &GraphSnapshot,
        created: &[LinkPair],
        generation: u64,
    ) -> Self {
        let links = graph
            .links()
            .map(|l| {
                let node_pair = LinkPair::nodes(l.output_node, l.input_node);
                let port_pair = LinkPair::ports(l.output_port, l.input_port);
                LinkView {
                    id: l.id,
                    output_node: l.output_node,
                    output_port: l.output_port,
                    input_node: l.input_node,
                    input_port: l.input_port,
                    state: l.state,
                    label: endpoint::link_label(graph, &node_pair),
                    created_here: created.contains(&node_pair) || created.contains(&port_pair),
                }
            })
            .collect();

        let created_links = created
            .iter()
            .map(|pair| CreatedLinkView {
                pair: *pair,
                label: endpoint::link_label(graph, pair),
                active: pair.is_linked(graph),
            })
            .collect();

        Self {
            state,
            sources: endpoint::audio_sources(graph),
            targets: endpoint::microphones(graph),
            links,
            created_links,
            node_count: graph.node_count(),
            port_count: graph.port_count(),
            link_count: graph.link_count(),
            generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::{link, studio};

    #[test]
    fn test_build_from_graph() {
        let graph = studio();
        let snapshot = StateSnapshot::build(DaemonState::Running, &graph, &[], 3);

        assert_eq!(snapshot.sources.len(), 2);
        assert_eq!(snapshot.targets.len(), 1);
        assert_eq!(snapshot.links.len(), 1);
        assert_eq!(snapshot.links[0].label, "Firefox → alsa_output.speakers");
        assert!(!snapshot.links[0].created_here);
        assert_eq!(snapshot.node_count, 4);
        assert_eq!(snapshot.link_count, 1);
        assert_eq!(snapshot.generation, 3);
    }

    #[test]
    fn test_created_links_are_flagged() {
        let mut graph = studio();
        graph.apply(&crate::GraphEvent::LinkAdded(link(201, (41, 110), (50, 120))));
        let created = [LinkPair::nodes(41, 50), LinkPair::nodes(40, 50)];

        let snapshot = StateSnapshot::build(DaemonState::Running, &graph, &created, 1);

        let view = snapshot.links.iter().find(|l| l.id == 201).unwrap();
        assert!(view.created_here);
        assert_eq!(snapshot.link_count, 2);
        assert_eq!(snapshot.created_links.len(), 2);
        assert!(snapshot.created_links[0].active);
        assert_eq!(snapshot.created_links[0].label, "mpv → alsa_input.usb-mic");
        // Recorded but not (yet) reported by PipeWire
        assert!(!snapshot.created_links[1].active);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&DaemonState::ShuttingDown).unwrap();
        assert_eq!(json, "\"shutting_down\"");
    }
}
