//! Snapshot diffing.
//!
//! The polling monitor only ever sees whole snapshots; diffing two of them
//! yields the same event stream a live registry listener would produce.

use soundstreamer_core::event::GraphEvent;
use soundstreamer_core::graph::{GraphSnapshot, Link};

/// Events that turn `old` into `new`.
///
/// Removals come first (links, ports, nodes), then additions (nodes, ports,
/// links), so that applying the events in order never references an object
/// that does not exist yet.
#[must_use]
pub fn diff(old: &GraphSnapshot, new: &GraphSnapshot) -> Vec<GraphEvent> {
    let mut events = Vec::new();

    for link in old.links() {
        if new.link(link.id).is_none() {
            events.push(GraphEvent::LinkRemoved { id: link.id });
        }
    }
    for port in old.ports() {
        if new.port(port.id).is_none() {
            events.push(GraphEvent::PortRemoved { id: port.id });
        }
    }
    for node in old.nodes() {
        if new.node(node.id).is_none() {
            events.push(GraphEvent::NodeRemoved { id: node.id, name: node.name.clone() });
        }
    }

    for node in new.nodes() {
        match old.node(node.id) {
            None => events.push(GraphEvent::NodeAdded(node.clone())),
            Some(prev) if prev != node => events.push(GraphEvent::NodeChanged(node.clone())),
            Some(_) => {}
        }
    }
    for port in new.ports() {
        match old.port(port.id) {
            Some(prev) if prev == port => {}
            // A port never changes in place; a different object under the
            // same id is a re-add.
            _ => events.push(GraphEvent::PortAdded(port.clone())),
        }
    }
    for link in new.links() {
        match old.link(link.id) {
            None => events.push(GraphEvent::LinkAdded(link.clone())),
            Some(prev) if prev == link => {}
            Some(prev) if same_endpoints(prev, link) && prev.error == link.error => {
                events.push(GraphEvent::LinkStateChanged { id: link.id, state: link.state });
            }
            Some(_) => events.push(GraphEvent::LinkAdded(link.clone())),
        }
    }

    events
}

fn same_endpoints(a: &Link, b: &Link) -> bool {
    a.output_node == b.output_node
        && a.output_port == b.output_port
        && a.input_node == b.input_node
        && a.input_port == b.input_port
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use soundstreamer_core::graph::{LinkState, Node, Port, PortDirection};

    use super::*;
    use crate::dump::{fixtures::STUDIO_DUMP, parse_dump};

    fn studio() -> GraphSnapshot {
        parse_dump(STUDIO_DUMP).unwrap()
    }

    fn apply_all(mut graph: GraphSnapshot, events: &[GraphEvent]) -> GraphSnapshot {
        for event in events {
            graph.apply(event);
        }
        graph
    }

    #[test]
    fn test_identical_snapshots_have_no_diff() {
        assert!(diff(&studio(), &studio()).is_empty());
    }

    #[test]
    fn test_app_stream_disappears() {
        let old = studio();
        let mut new = old.clone();
        for id in [200, 100, 101, 40] {
            new.apply(&GraphEvent::ObjectRemoved { id });
        }

        let events = diff(&old, &new);

        assert_eq!(
            events,
            vec![
                GraphEvent::LinkRemoved { id: 200 },
                GraphEvent::PortRemoved { id: 100 },
                GraphEvent::PortRemoved { id: 101 },
                GraphEvent::NodeRemoved { id: 40, name: "Firefox".into() },
            ]
        );
        assert_eq!(apply_all(old, &events), new);
    }

    #[test]
    fn test_link_state_change() {
        let old = studio();
        let mut new = old.clone();
        new.apply(&GraphEvent::LinkStateChanged { id: 200, state: LinkState::Paused });

        assert_eq!(
            diff(&old, &new),
            vec![GraphEvent::LinkStateChanged { id: 200, state: LinkState::Paused }]
        );
    }

    #[test]
    fn test_media_title_change_is_node_changed() {
        let old = studio();
        let mut firefox = old.node(40).unwrap().clone();
        firefox.media_name = Some("Next Song".into());
        let mut new = old.clone();
        new.apply(&GraphEvent::NodeChanged(firefox.clone()));

        assert_eq!(diff(&old, &new), vec![GraphEvent::NodeChanged(firefox)]);
    }

    fn arb_graph() -> impl Strategy<Value = GraphSnapshot> {
        let nodes = proptest::collection::btree_set(0u32..8, 0..6);
        let ports = proptest::collection::vec((10u32..30, 0u32..8, any::<bool>()), 0..10);
        let links = proptest::collection::vec((40u32..60, 10u32..30, 10u32..30, 0u8..3), 0..8);

        (nodes, ports, links).prop_map(|(nodes, ports, links)| {
            let nodes = nodes.into_iter().map(|id| {
                let mut props = BTreeMap::new();
                props.insert("node.name".to_string(), format!("node-{id}"));
                Node::from_props(id, props)
            });
            let ports = ports.into_iter().map(|(id, node_id, out)| Port {
                id,
                node_id,
                name: format!("port-{id}"),
                direction: if out { PortDirection::Output } else { PortDirection::Input },
                channel: None,
                alias: None,
            });
            let links = links.into_iter().map(|(id, out, inp, state)| Link {
                id,
                output_node: out % 8,
                output_port: out,
                input_node: inp % 8,
                input_port: inp,
                state: [LinkState::Init, LinkState::Paused, LinkState::Active][state as usize],
                error: None,
            });
            GraphSnapshot::from_parts(nodes, ports, links)
        })
    }

    proptest! {
        #[test]
        fn prop_diff_applied_to_old_yields_new(old in arb_graph(), new in arb_graph()) {
            let events = diff(&old, &new);
            prop_assert_eq!(apply_all(old, &events), new);
        }
    }
}
