//! The graph mirror.
//!
//! Keeps an in-memory copy of the PipeWire graph consistent with what
//! PipeWire reports, and turns link/unlink requests into `pw-link` calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use soundstreamer_core::endpoint::{self, AudioEndpoint};
use soundstreamer_core::event::GraphEvent;
use soundstreamer_core::graph::{GraphSnapshot, PortDirection};
use soundstreamer_core::ledger::{LinkLedger, LinkPair};

use crate::cli::GraphBackend;
use crate::dump::parse_dump;
use crate::error::{PwError, PwResult};
use crate::reconcile::Reconciler;

/// Result of a link request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// `pw-link` created the link; it shows up on the next refresh
    Created,
    /// The endpoints were already linked; nothing was done
    AlreadyLinked,
}

/// Result of tearing down the session's links.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Pairs that were unlinked
    pub removed: Vec<LinkPair>,
    /// Pairs `pw-link -d` refused, with the error
    pub failed: Vec<(LinkPair, PwError)>,
}

/// Mirrors the PipeWire graph.
///
/// Readers get a cheap [`Arc`] of the latest snapshot and never block;
/// refreshes swap the snapshot atomically.
pub struct GraphMirror {
    backend: Arc<dyn GraphBackend>,
    /// Latest graph reported by PipeWire
    snapshot: ArcSwap<GraphSnapshot>,
    /// Links created by this session
    ledger: RwLock<LinkLedger>,
    /// Number of successful refreshes
    generation: AtomicU64,
}

impl GraphMirror {
    /// Create a mirror with an empty snapshot.
    #[must_use]
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            backend,
            snapshot: ArcSwap::from_pointee(GraphSnapshot::new()),
            ledger: RwLock::new(LinkLedger::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Query PipeWire and replace the local snapshot.
    ///
    /// # Errors
    /// Returns an error if `pw-dump` fails or prints something unparseable.
    /// The previous snapshot is kept in that case.
    pub fn refresh(&self) -> PwResult<Arc<GraphSnapshot>> {
        let json = self.backend.dump()?;
        let graph = Arc::new(parse_dump(&json)?);

        self.snapshot.store(Arc::clone(&graph));
        self.reconcile();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        debug!(
            generation,
            nodes = graph.node_count(),
            ports = graph.port_count(),
            links = graph.link_count(),
            "Graph refreshed"
        );
        Ok(graph)
    }

    /// Fold a live registry event into the snapshot.
    pub fn apply_event(&self, event: &GraphEvent) {
        if !event.is_graph_change() {
            return;
        }
        self.snapshot.rcu(|current| {
            let mut next = GraphSnapshot::clone(current);
            next.apply(event);
            next
        });
    }

    /// Forget ledger pairs the current snapshot no longer backs, and confirm
    /// pending pairs it shows linked.
    ///
    /// Runs on every refresh; live monitors call it after folding events.
    pub fn reconcile(&self) -> Vec<LinkPair> {
        let graph = self.snapshot.load();
        Reconciler::apply(&mut self.ledger.write(), &graph)
    }

    /// Link a single output port to a single input port.
    ///
    /// # Errors
    /// Returns an error if either port is unknown, a port has the wrong
    /// direction, or PipeWire refuses the link.
    pub fn request_link(&self, output_port: u32, input_port: u32) -> PwResult<LinkOutcome> {
        let graph = self.snapshot();

        let output = graph.port(output_port).ok_or(PwError::PortNotFound(output_port))?;
        if output.direction != PortDirection::Output {
            return Err(PwError::InvalidDirection { port: output_port, expected: "output" });
        }
        let input = graph.port(input_port).ok_or(PwError::PortNotFound(input_port))?;
        if input.direction != PortDirection::Input {
            return Err(PwError::InvalidDirection { port: input_port, expected: "input" });
        }

        self.link_pair(&graph, LinkPair::ports(output_port, input_port))
    }

    /// Link two nodes; PipeWire pairs up their ports.
    ///
    /// # Errors
    /// Returns an error if either node is unknown or PipeWire refuses the link.
    pub fn request_node_link(&self, output_node: u32, input_node: u32) -> PwResult<LinkOutcome> {
        let graph = self.snapshot();

        for id in [output_node, input_node] {
            if graph.node(id).is_none() {
                return Err(PwError::NodeNotFound(id));
            }
        }

        self.link_pair(&graph, LinkPair::nodes(output_node, input_node))
    }

    fn link_pair(&self, graph: &GraphSnapshot, pair: LinkPair) -> PwResult<LinkOutcome> {
        if pair.is_linked(graph) {
            info!(%pair, "Link already exists");
            return Ok(LinkOutcome::AlreadyLinked);
        }

        self.backend.link(pair.output, pair.input)?;
        self.ledger.write().record(pair);
        info!(%pair, "Link created");
        Ok(LinkOutcome::Created)
    }

    /// Remove any link PipeWire reports, by link ID.
    ///
    /// # Errors
    /// Returns an error if the link is unknown or PipeWire refuses to remove it.
    pub fn request_unlink(&self, link_id: u32) -> PwResult<()> {
        let graph = self.snapshot();
        let link = graph.link(link_id).ok_or(PwError::LinkNotFound(link_id))?;

        self.backend.unlink_id(link_id)?;

        let mut ledger = self.ledger.write();
        ledger.forget(&LinkPair::ports(link.output_port, link.input_port));
        // A node-scope pair goes once its last port link is gone
        let node_pair = LinkPair::nodes(link.output_node, link.input_node);
        if graph.node_links(link.output_node, link.input_node).all(|l| l.id == link_id) {
            ledger.forget(&node_pair);
        }

        info!(link_id, "Link removed");
        Ok(())
    }

    /// Remove a link by its endpoints.
    ///
    /// # Errors
    /// Returns an error if PipeWire refuses to remove the link. The pair is
    /// kept in the ledger in that case.
    pub fn remove_link(&self, pair: &LinkPair) -> PwResult<()> {
        self.backend.unlink(pair.output, pair.input)?;
        self.ledger.write().forget(pair);
        info!(%pair, "Link removed");
        Ok(())
    }

    /// Remove every link this session created.
    ///
    /// The ledger is empty afterwards, whether or not each removal succeeded.
    pub fn remove_all_links(&self) -> CleanupReport {
        let pairs = self.ledger.write().drain();
        let mut report = CleanupReport::default();

        for pair in pairs {
            match self.backend.unlink(pair.output, pair.input) {
                Ok(()) => report.removed.push(pair),
                Err(e) => {
                    warn!(%pair, error = %e, "Failed to remove link");
                    report.failed.push((pair, e));
                }
            }
        }

        info!(removed = report.removed.len(), failed = report.failed.len(), "Session links removed");
        report
    }

    /// Latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.snapshot.load_full()
    }

    /// Applications currently playing audio.
    #[must_use]
    pub fn sources(&self) -> Vec<AudioEndpoint> {
        endpoint::audio_sources(&self.snapshot.load())
    }

    /// Microphones.
    #[must_use]
    pub fn targets(&self) -> Vec<AudioEndpoint> {
        endpoint::microphones(&self.snapshot.load())
    }

    /// Links created by this session, in creation order.
    #[must_use]
    pub fn created_links(&self) -> Vec<LinkPair> {
        self.ledger.read().pairs().to_vec()
    }

    /// Whether this session created the given pair.
    #[must_use]
    pub fn is_created_here(&self, pair: &LinkPair) -> bool {
        self.ledger.read().contains(pair)
    }

    /// Number of successful refreshes so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
