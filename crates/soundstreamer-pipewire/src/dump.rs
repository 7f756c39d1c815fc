//! Parsing of `pw-dump` output.
//!
//! `pw-dump` prints a JSON array with one object per PipeWire global. Only
//! nodes, ports and links are of interest; everything else is skipped.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use soundstreamer_core::graph::{GraphSnapshot, Link, LinkState, Node, Port, PortDirection};

use crate::error::PwResult;

const TYPE_NODE: &str = "PipeWire:Interface:Node";
const TYPE_PORT: &str = "PipeWire:Interface:Port";
const TYPE_LINK: &str = "PipeWire:Interface:Link";

#[derive(Debug, Deserialize)]
struct RawObject {
    id: u32,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    info: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    #[serde(default)]
    props: Map<String, Value>,
    #[serde(default)]
    direction: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawLinkInfo {
    output_node_id: u32,
    output_port_id: u32,
    input_node_id: u32,
    input_port_id: u32,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse `pw-dump` JSON into a graph snapshot.
///
/// # Errors
/// Returns an error if the output is not a JSON array.
/// Individual objects with unexpected shapes are skipped.
pub fn parse_dump(json: &str) -> PwResult<GraphSnapshot> {
    let values: Vec<Value> = serde_json::from_str(json)?;

    let mut nodes = Vec::new();
    let mut ports = Vec::new();
    let mut links = Vec::new();

    for value in values {
        let object = match serde_json::from_value::<RawObject>(value) {
            Ok(object) => object,
            Err(e) => {
                debug!(error = %e, "Skipping pw-dump entry");
                continue;
            }
        };

        // Removed objects show up with a null info block
        let Some(info) = object.info else {
            continue;
        };

        match object.kind.as_str() {
            TYPE_NODE => {
                let raw: RawInfo = serde_json::from_value(info).unwrap_or_default();
                nodes.push(Node::from_props(object.id, stringify_props(&raw.props)));
            }
            TYPE_PORT => {
                let raw: RawInfo = serde_json::from_value(info).unwrap_or_default();
                if let Some(port) = parse_port(object.id, &raw) {
                    ports.push(port);
                }
            }
            TYPE_LINK => match serde_json::from_value::<RawLinkInfo>(info) {
                Ok(raw) => links.push(Link {
                    id: object.id,
                    output_node: raw.output_node_id,
                    output_port: raw.output_port_id,
                    input_node: raw.input_node_id,
                    input_port: raw.input_port_id,
                    state: raw.state.as_deref().map_or(LinkState::Init, LinkState::parse),
                    error: raw.error,
                }),
                Err(e) => warn!(id = object.id, error = %e, "Skipping malformed link"),
            },
            _ => {}
        }
    }

    debug!(nodes = nodes.len(), ports = ports.len(), links = links.len(), "Parsed pw-dump");
    Ok(GraphSnapshot::from_parts(nodes, ports, links))
}

fn parse_port(id: u32, raw: &RawInfo) -> Option<Port> {
    let props = stringify_props(&raw.props);

    let Some(node_id) = props.get("node.id").and_then(|s| s.parse().ok()) else {
        debug!(id, "Skipping port without node.id");
        return None;
    };

    let direction = raw
        .direction
        .as_deref()
        .or_else(|| props.get("port.direction").map(String::as_str))
        .and_then(PortDirection::parse);
    let Some(direction) = direction else {
        debug!(id, "Skipping port without direction");
        return None;
    };

    Some(Port {
        id,
        node_id,
        name: props.get("port.name").cloned().unwrap_or_else(|| "unknown".to_string()),
        direction,
        channel: props.get("audio.channel").cloned(),
        alias: props.get("port.alias").cloned(),
    })
}

/// Flatten JSON property values to strings, the way PipeWire dictionaries hold them.
fn stringify_props(props: &Map<String, Value>) -> BTreeMap<String, String> {
    props
        .iter()
        .filter_map(|(k, v)| {
            let value = match v {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((k.clone(), value))
        })
        .collect()
}
