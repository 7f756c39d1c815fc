//! Ledger reconciliation.
//!
//! A link only exists while PipeWire reports it. When an application stops
//! playing, its stream node goes away and takes our links with it; the ledger
//! must follow so that cleanup never targets objects that are gone.

use tracing::{debug, info};

use soundstreamer_core::graph::GraphSnapshot;
use soundstreamer_core::ledger::{LinkLedger, LinkPair};

/// Actions that the reconciler determines need to be taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// PipeWire reports a pending link for the first time
    Confirm(LinkPair),
    /// An endpoint of a recorded link vanished
    EndpointGone(LinkPair),
    /// Both endpoints exist but PipeWire no longer reports a confirmed link
    LinkGone(LinkPair),
}

impl ReconcileAction {
    /// The ledger pair this action concerns.
    #[must_use]
    pub fn pair(&self) -> &LinkPair {
        match self {
            Self::Confirm(pair) | Self::EndpointGone(pair) | Self::LinkGone(pair) => pair,
        }
    }
}

/// Compares the session ledger against the graph PipeWire reports.
pub struct Reconciler;

impl Reconciler {
    /// Compute the ledger entries that need attention.
    ///
    /// A pending pair that is not linked yet is left alone: the snapshot may
    /// have been dumped before `pw-link` ran.
    #[must_use]
    pub fn reconcile(ledger: &LinkLedger, graph: &GraphSnapshot) -> Vec<ReconcileAction> {
        ledger
            .pairs()
            .iter()
            .filter_map(|pair| {
                let confirmed = ledger.is_confirmed(pair);
                if !pair.endpoints_exist(graph) {
                    Some(ReconcileAction::EndpointGone(*pair))
                } else if pair.is_linked(graph) {
                    (!confirmed).then_some(ReconcileAction::Confirm(*pair))
                } else if confirmed {
                    Some(ReconcileAction::LinkGone(*pair))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Confirm newly seen pairs and drop stale ones. Returns the dropped pairs.
    pub fn apply(ledger: &mut LinkLedger, graph: &GraphSnapshot) -> Vec<LinkPair> {
        let mut forgotten = Vec::new();

        for action in Self::reconcile(ledger, graph) {
            match action {
                ReconcileAction::Confirm(pair) => {
                    debug!(%pair, "Link reported by PipeWire");
                    ledger.confirm(&pair);
                    continue;
                }
                ReconcileAction::EndpointGone(pair) => {
                    info!(%pair, "Link endpoint disappeared, forgetting link");
                }
                ReconcileAction::LinkGone(pair) => {
                    info!(%pair, "Link no longer reported by PipeWire, forgetting it");
                }
            }
            ledger.forget(action.pair());
            forgotten.push(*action.pair());
        }

        if !forgotten.is_empty() {
            debug!(remaining = ledger.len(), "Ledger reconciled");
        }
        forgotten
    }
}

#[cfg(test)]
mod tests {
    use soundstreamer_core::event::GraphEvent;

    use super::*;
    use crate::dump::{fixtures::STUDIO_DUMP, parse_dump};

    fn studio() -> GraphSnapshot {
        parse_dump(STUDIO_DUMP).unwrap()
    }

    #[test]
    fn test_linked_pair_is_kept() {
        let mut ledger = LinkLedger::new();
        ledger.record(LinkPair::nodes(40, 60));
        ledger.record(LinkPair::ports(100, 130));

        assert!(Reconciler::apply(&mut ledger, &studio()).is_empty());
        assert_eq!(ledger.len(), 2);
        assert!(ledger.is_confirmed(&LinkPair::nodes(40, 60)));
        assert!(Reconciler::reconcile(&ledger, &studio()).is_empty());
    }

    #[test]
    fn test_vanished_node_is_forgotten() {
        let mut ledger = LinkLedger::new();
        ledger.record(LinkPair::nodes(40, 60));
        let mut graph = studio();
        for id in [200, 100, 101, 40] {
            graph.apply(&GraphEvent::ObjectRemoved { id });
        }

        assert_eq!(
            Reconciler::reconcile(&ledger, &graph),
            vec![ReconcileAction::EndpointGone(LinkPair::nodes(40, 60))]
        );
        assert_eq!(Reconciler::apply(&mut ledger, &graph), vec![LinkPair::nodes(40, 60)]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_externally_removed_link_is_forgotten() {
        let mut ledger = LinkLedger::new();
        ledger.record(LinkPair::nodes(40, 60));
        Reconciler::apply(&mut ledger, &studio());
        let mut graph = studio();
        graph.apply(&GraphEvent::LinkRemoved { id: 200 });

        assert_eq!(
            Reconciler::reconcile(&ledger, &graph),
            vec![ReconcileAction::LinkGone(LinkPair::nodes(40, 60))]
        );
        assert_eq!(Reconciler::apply(&mut ledger, &graph), vec![LinkPair::nodes(40, 60)]);
    }

    #[test]
    fn test_pending_pair_survives_snapshot_without_link() {
        let mut ledger = LinkLedger::new();
        // Recorded by pw-link, but the snapshot was dumped before it ran
        ledger.record(LinkPair::nodes(41, 50));

        assert!(Reconciler::reconcile(&ledger, &studio()).is_empty());
        assert!(Reconciler::apply(&mut ledger, &studio()).is_empty());
        assert!(ledger.contains(&LinkPair::nodes(41, 50)));
        assert!(!ledger.is_confirmed(&LinkPair::nodes(41, 50)));
    }
}
