//! Ledger of links created during the current session.
//!
//! Only links recorded here are torn down when the session ends; links made
//! by other tools or by the session manager are never touched.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::GraphSnapshot;

/// Whether a pair names nodes or individual ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkScope {
    /// Node to node: PipeWire pairs up the ports
    Node,
    /// A single output port to a single input port
    Port,
}

/// The two endpoints handed to `pw-link`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkPair {
    /// Output node or port ID
    pub output: u32,
    /// Input node or port ID
    pub input: u32,
    /// What the IDs refer to
    pub scope: LinkScope,
}

impl LinkPair {
    #[must_use]
    pub fn new(output: u32, input: u32, scope: LinkScope) -> Self {
        Self { output, input, scope }
    }

    /// Node-to-node pair.
    #[must_use]
    pub fn nodes(output: u32, input: u32) -> Self {
        Self::new(output, input, LinkScope::Node)
    }

    /// Port-to-port pair.
    #[must_use]
    pub fn ports(output: u32, input: u32) -> Self {
        Self::new(output, input, LinkScope::Port)
    }

    /// Owning node IDs of both endpoints, if they can be resolved.
    #[must_use]
    pub fn node_ids(&self, graph: &GraphSnapshot) -> (Option<u32>, Option<u32>) {
        match self.scope {
            LinkScope::Node => (Some(self.output), Some(self.input)),
            LinkScope::Port => (
                graph.port(self.output).map(|p| p.node_id),
                graph.port(self.input).map(|p| p.node_id),
            ),
        }
    }

    /// Whether both endpoints still exist in the graph.
    #[must_use]
    pub fn endpoints_exist(&self, graph: &GraphSnapshot) -> bool {
        match self.scope {
            LinkScope::Node => graph.node(self.output).is_some() && graph.node(self.input).is_some(),
            LinkScope::Port => graph.port(self.output).is_some() && graph.port(self.input).is_some(),
        }
    }

    /// Whether PipeWire reports a link for this pair.
    #[must_use]
    pub fn is_linked(&self, graph: &GraphSnapshot) -> bool {
        match self.scope {
            LinkScope::Node => graph.has_node_link(self.output, self.input),
            LinkScope::Port => graph.has_port_link(self.output, self.input),
        }
    }
}

impl fmt::Display for LinkPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.scope {
            LinkScope::Node => "node",
            LinkScope::Port => "port",
        };
        write!(f, "{kind} {} -> {kind} {}", self.output, self.input)
    }
}

/// Ordered, duplicate-free list of session-created links.
///
/// A pair stays pending until a snapshot shows it linked. Snapshots taken
/// while `pw-link` was still running can predate the link, so only confirmed
/// pairs may be forgotten for no longer being linked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkLedger {
    pairs: Vec<LinkPair>,
    confirmed: HashSet<LinkPair>,
}

impl LinkLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a created link. Returns `false` if it was already recorded.
    pub fn record(&mut self, pair: LinkPair) -> bool {
        if self.pairs.contains(&pair) {
            return false;
        }
        self.pairs.push(pair);
        true
    }

    /// Mark a recorded pair as seen in the graph. Returns `false` if it was
    /// not recorded or already confirmed.
    pub fn confirm(&mut self, pair: &LinkPair) -> bool {
        self.pairs.contains(pair) && self.confirmed.insert(*pair)
    }

    /// Whether PipeWire has reported the pair since it was recorded.
    #[must_use]
    pub fn is_confirmed(&self, pair: &LinkPair) -> bool {
        self.confirmed.contains(pair)
    }

    /// Forget a link. Returns `false` if it was not recorded.
    pub fn forget(&mut self, pair: &LinkPair) -> bool {
        self.confirmed.remove(pair);
        let before = self.pairs.len();
        self.pairs.retain(|p| p != pair);
        self.pairs.len() != before
    }

    #[must_use]
    pub fn contains(&self, pair: &LinkPair) -> bool {
        self.pairs.contains(pair)
    }

    /// Recorded pairs in creation order.
    #[must_use]
    pub fn pairs(&self) -> &[LinkPair] {
        &self.pairs
    }

    /// Take every recorded pair, leaving the ledger empty.
    pub fn drain(&mut self) -> Vec<LinkPair> {
        self.confirmed.clear();
        std::mem::take(&mut self.pairs)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::studio;

    #[test]
    fn test_record_is_deduplicated() {
        let mut ledger = LinkLedger::new();

        assert!(ledger.record(LinkPair::nodes(40, 50)));
        assert!(!ledger.record(LinkPair::nodes(40, 50)));
        // Same ids, different scope is a different link
        assert!(ledger.record(LinkPair::ports(40, 50)));

        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_forget_and_drain() {
        let mut ledger = LinkLedger::new();
        ledger.record(LinkPair::nodes(40, 50));
        ledger.record(LinkPair::nodes(41, 50));

        assert!(ledger.forget(&LinkPair::nodes(40, 50)));
        assert!(!ledger.forget(&LinkPair::nodes(40, 50)));

        let drained = ledger.drain();
        assert_eq!(drained, vec![LinkPair::nodes(41, 50)]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_confirm_only_recorded_pairs() {
        let mut ledger = LinkLedger::new();
        ledger.record(LinkPair::nodes(40, 50));

        assert!(!ledger.confirm(&LinkPair::nodes(41, 50)));
        assert!(!ledger.is_confirmed(&LinkPair::nodes(40, 50)));
        assert!(ledger.confirm(&LinkPair::nodes(40, 50)));
        assert!(ledger.is_confirmed(&LinkPair::nodes(40, 50)));

        ledger.forget(&LinkPair::nodes(40, 50));
        ledger.record(LinkPair::nodes(40, 50));
        assert!(!ledger.is_confirmed(&LinkPair::nodes(40, 50)));
    }

    #[test]
    fn test_preserves_creation_order() {
        let mut ledger = LinkLedger::new();
        ledger.record(LinkPair::nodes(3, 9));
        ledger.record(LinkPair::nodes(1, 9));
        ledger.record(LinkPair::nodes(2, 9));

        let outputs: Vec<_> = ledger.pairs().iter().map(|p| p.output).collect();
        assert_eq!(outputs, vec![3, 1, 2]);
    }

    #[test]
    fn test_pair_graph_checks() {
        let graph = studio();

        let existing = LinkPair::nodes(40, 60);
        assert!(existing.endpoints_exist(&graph));
        assert!(existing.is_linked(&graph));

        let unlinked = LinkPair::ports(110, 120);
        assert!(unlinked.endpoints_exist(&graph));
        assert!(!unlinked.is_linked(&graph));
        assert_eq!(unlinked.node_ids(&graph), (Some(41), Some(50)));

        let gone = LinkPair::ports(110, 999);
        assert!(!gone.endpoints_exist(&graph));
        assert_eq!(gone.node_ids(&graph), (Some(41), None));
    }

    #[test]
    fn test_display() {
        assert_eq!(LinkPair::nodes(40, 50).to_string(), "node 40 -> node 50");
        assert_eq!(LinkPair::ports(1, 2).to_string(), "port 1 -> port 2");
    }
}
