//! Command execution against the graph mirror.
//!
//! Everything here blocks on PipeWire tools; the main loop runs it through
//! `spawn_blocking`.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use soundstreamer_core::Command;
use soundstreamer_core::ledger::LinkPair;
use soundstreamer_ipc::{
    ErrorInfo, Event, EventType, LinkFailure, LinkReport, LinksCreatedData, LinksRemovedData,
    RemoveReport,
};
use soundstreamer_pipewire::{GraphMirror, LinkOutcome, PwError};

/// What executing a command produced.
#[derive(Debug)]
pub struct Outcome {
    /// Answer for the requesting client
    pub result: Result<Value, ErrorInfo>,
    /// Events to broadcast
    pub events: Vec<Event>,
    /// Whether the graph may have changed and should be re-read
    pub graph_touched: bool,
    /// Whether the daemon should stop
    pub shutdown: bool,
}

impl Outcome {
    fn reply(result: Result<Value, ErrorInfo>) -> Self {
        Self { result, events: Vec::new(), graph_touched: false, shutdown: false }
    }

    fn touched(result: Result<Value, ErrorInfo>, events: Vec<Event>) -> Self {
        Self { result, events, graph_touched: true, shutdown: false }
    }
}

/// Map a PipeWire error to the error sent to clients.
#[must_use]
pub fn error_info(err: &PwError) -> ErrorInfo {
    let code = match err {
        PwError::NodeNotFound(_) | PwError::PortNotFound(_) | PwError::LinkNotFound(_) => {
            ErrorInfo::NOT_FOUND
        }
        PwError::InvalidDirection { .. } => ErrorInfo::BAD_REQUEST,
        _ => ErrorInfo::INTERNAL,
    };
    ErrorInfo::new(code, err.to_string())
}

fn to_value(value: &impl Serialize) -> Result<Value, ErrorInfo> {
    serde_json::to_value(value).map_err(|e| ErrorInfo::new(ErrorInfo::INTERNAL, e.to_string()))
}

/// Execute a command against the mirror.
pub fn execute(mirror: &GraphMirror, command: Command) -> Outcome {
    match command {
        Command::Refresh => match mirror.refresh() {
            Ok(graph) => Outcome::reply(Ok(json!({
                "generation": mirror.generation(),
                "nodes": graph.node_count(),
                "links": graph.link_count(),
            }))),
            Err(e) => {
                warn!(error = %e, "Refresh failed");
                Outcome::reply(Err(error_info(&e)))
            }
        },

        Command::CreateLinks { sources, targets } => {
            let mut report = LinkReport::default();
            for &source in &sources {
                for &target in &targets {
                    let pair = LinkPair::nodes(source, target);
                    match mirror.request_node_link(source, target) {
                        Ok(LinkOutcome::Created) => report.created.push(pair),
                        Ok(LinkOutcome::AlreadyLinked) => report.already_linked.push(pair),
                        Err(e) => {
                            warn!(%pair, error = %e, "Failed to create link");
                            report.failed.push(LinkFailure { pair, message: e.to_string() });
                        }
                    }
                }
            }
            info!(
                created = report.created.len(),
                existing = report.already_linked.len(),
                failed = report.failed.len(),
                "{}",
                report.summary()
            );
            link_outcome(report)
        }

        Command::LinkPorts { output_port, input_port } => {
            let pair = LinkPair::ports(output_port, input_port);
            match mirror.request_link(output_port, input_port) {
                Ok(outcome) => {
                    let mut report = LinkReport::default();
                    match outcome {
                        LinkOutcome::Created => report.created.push(pair),
                        LinkOutcome::AlreadyLinked => report.already_linked.push(pair),
                    }
                    link_outcome(report)
                }
                Err(e) => {
                    warn!(%pair, error = %e, "Failed to link ports");
                    Outcome::reply(Err(error_info(&e)))
                }
            }
        }

        Command::RemoveLinks { pairs } => {
            let mut report = RemoveReport::default();
            for pair in pairs {
                if !mirror.is_created_here(&pair) {
                    report.failed.push(LinkFailure {
                        pair,
                        message: "Link was not created by SoundStreamer".to_string(),
                    });
                    continue;
                }
                match mirror.remove_link(&pair) {
                    Ok(()) => report.removed.push(pair),
                    Err(e) => report.failed.push(LinkFailure { pair, message: e.to_string() }),
                }
            }
            remove_outcome(report)
        }

        Command::UnlinkById { id } => {
            let pair = mirror.snapshot().link(id).map(|l| LinkPair::ports(l.output_port, l.input_port));
            match (mirror.request_unlink(id), pair) {
                (Ok(()), Some(pair)) => {
                    remove_outcome(RemoveReport { removed: vec![pair], failed: Vec::new() })
                }
                (Ok(()), None) => Outcome::touched(Ok(json!({"success": true})), Vec::new()),
                (Err(e), _) => Outcome::reply(Err(error_info(&e))),
            }
        }

        Command::RemoveAllLinks => {
            let cleanup = mirror.remove_all_links();
            let report = RemoveReport {
                removed: cleanup.removed,
                failed: cleanup
                    .failed
                    .into_iter()
                    .map(|(pair, e)| LinkFailure { pair, message: e.to_string() })
                    .collect(),
            };
            remove_outcome(report)
        }

        Command::Shutdown => Outcome {
            result: Ok(json!({"success": true})),
            events: Vec::new(),
            graph_touched: false,
            shutdown: true,
        },
    }
}

fn link_outcome(report: LinkReport) -> Outcome {
    let mut events = Vec::new();
    if !report.created.is_empty() || !report.failed.is_empty() {
        events.push(Event::new(
            EventType::LinksCreated,
            &LinksCreatedData { created: report.created.clone(), failed: report.failed.clone() },
        ));
    }
    Outcome::touched(to_value(&report), events)
}

fn remove_outcome(report: RemoveReport) -> Outcome {
    let mut events = Vec::new();
    if !report.removed.is_empty() {
        events.push(Event::new(
            EventType::LinksRemoved,
            &LinksRemovedData { removed: report.removed.clone() },
        ));
    }
    Outcome::touched(to_value(&report), events)
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Firefox linked into a USB mic, mpv not linked yet.
    pub const DUMP: &str = r#"[
      { "id": 40, "type": "PipeWire:Interface:Node",
        "info": { "props": { "node.name": "Firefox", "media.class": "Stream/Output/Audio",
                             "application.name": "Firefox", "media.name": "Song" } } },
      { "id": 41, "type": "PipeWire:Interface:Node",
        "info": { "props": { "node.name": "mpv", "media.class": "Stream/Output/Audio" } } },
      { "id": 50, "type": "PipeWire:Interface:Node",
        "info": { "props": { "node.name": "alsa_input.usb-mic", "media.class": "Audio/Source" } } },
      { "id": 100, "type": "PipeWire:Interface:Port",
        "info": { "direction": "output", "props": { "port.name": "output_FL", "node.id": 40 } } },
      { "id": 120, "type": "PipeWire:Interface:Port",
        "info": { "direction": "input", "props": { "port.name": "input_FL", "node.id": 50 } } },
      { "id": 200, "type": "PipeWire:Interface:Link",
        "info": { "output-node-id": 40, "output-port-id": 100,
                  "input-node-id": 50, "input-port-id": 120, "state": "active" } }
    ]"#;
}
