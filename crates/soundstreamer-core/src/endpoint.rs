//! Selectable endpoints: applications playing audio and microphones.

use serde::{Deserialize, Serialize};

use crate::graph::GraphSnapshot;
use crate::ledger::LinkPair;

/// Which list an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Application stream playing audio
    Source,
    /// Microphone the audio is routed into
    Target,
}

/// A node the user can pick as a link endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEndpoint {
    /// PipeWire node ID
    pub id: u32,
    /// Label shown to the user
    pub display_name: String,
    /// Source or target
    pub kind: EndpointKind,
}

/// Applications currently playing audio.
///
/// Labelled `<application> - <media title>` when the stream carries a title.
#[must_use]
pub fn audio_sources(graph: &GraphSnapshot) -> Vec<AudioEndpoint> {
    graph
        .nodes()
        .filter(|n| n.is_app_stream())
        .map(|n| {
            let process = n
                .application_name
                .clone()
                .or_else(|| n.properties.get("node.name").cloned())
                .unwrap_or_else(|| "Unknown App".to_string());

            let display_name = match n.media_name.as_deref() {
                Some(title) if !title.is_empty() => format!("{process} - {title}"),
                _ => process,
            };

            AudioEndpoint { id: n.id, display_name, kind: EndpointKind::Source }
        })
        .collect()
}

/// Microphones (audio source nodes, including virtual ones).
#[must_use]
pub fn microphones(graph: &GraphSnapshot) -> Vec<AudioEndpoint> {
    graph
        .nodes()
        .filter(|n| n.is_microphone())
        .map(|n| AudioEndpoint {
            id: n.id,
            display_name: n
                .properties
                .get("node.name")
                .cloned()
                .unwrap_or_else(|| "Unknown Microphone".to_string()),
            kind: EndpointKind::Target,
        })
        .collect()
}

/// Label for a link, e.g. `Firefox → alsa_input.usb-mic`.
///
/// Port-scoped pairs are resolved to their owning nodes first.
#[must_use]
pub fn link_label(graph: &GraphSnapshot, pair: &LinkPair) -> String {
    let (output_node, input_node) = pair.node_ids(graph);
    format!("{} → {}", process_label(graph, output_node), process_label(graph, input_node))
}

fn process_label(graph: &GraphSnapshot, node_id: Option<u32>) -> String {
    match node_id {
        Some(id) => graph
            .node(id)
            .map_or_else(|| format!("Unknown Node ({id})"), crate::graph::Node::process_name),
        None => "Unknown Node".to_string(),
    }
}
