//! Request handling for the IPC server.

use serde_json::{Value, json};
use tracing::{debug, info};

use soundstreamer_core::Command;
use soundstreamer_core::state::StateSnapshot;
use soundstreamer_ipc::messages::{Diagnostics, ErrorInfo, Method};

/// How a request is answered.
#[derive(Debug)]
pub enum Handled {
    /// Answer right away from the state snapshot
    Reply(Result<Value, ErrorInfo>),
    /// Run a command first; the reply comes from its outcome
    Command(Command),
}

fn to_value(value: &impl serde::Serialize) -> Result<Value, ErrorInfo> {
    serde_json::to_value(value).map_err(|e| ErrorInfo::new(ErrorInfo::INTERNAL, e.to_string()))
}

/// Handle an IPC request.
pub fn handle_request(method: &Method, state: &StateSnapshot, diagnostics: &Diagnostics) -> Handled {
    let reply = match method {
        Method::GetState => to_value(state),
        Method::GetSources => to_value(&state.sources),
        Method::GetTargets => to_value(&state.targets),
        Method::GetLinks => to_value(&state.links),
        Method::GetCreatedLinks => to_value(&state.created_links),
        Method::GetDiagnostics => to_value(diagnostics),

        Method::Refresh => return Handled::Command(Command::Refresh),

        Method::CreateLinks { sources, targets } => {
            match Command::create_links(sources.clone(), targets.clone()) {
                Ok(command) => return Handled::Command(command),
                Err(e) => Err(ErrorInfo::bad_request(e.to_string())),
            }
        }

        Method::LinkPorts { output_port, input_port } => {
            return Handled::Command(Command::LinkPorts {
                output_port: *output_port,
                input_port: *input_port,
            });
        }

        Method::RemoveLinks { pairs } => match Command::remove_links(pairs.clone()) {
            Ok(command) => return Handled::Command(command),
            Err(e) => Err(ErrorInfo::bad_request(e.to_string())),
        },

        Method::UnlinkById { id } => {
            if state.links.iter().any(|l| l.id == *id) {
                return Handled::Command(Command::UnlinkById { id: *id });
            }
            Err(ErrorInfo::not_found(format!("Link not found: {id}")))
        }

        Method::RemoveAllLinks => return Handled::Command(Command::RemoveAllLinks),

        // Answered by the IPC server itself; only reached for unknown clients
        Method::Subscribe { events } | Method::Unsubscribe { events } => {
            debug!(?events, "Subscription request reached the daemon");
            Ok(json!({"success": true}))
        }

        Method::Shutdown => {
            info!("Shutdown requested via IPC");
            return Handled::Command(Command::Shutdown);
        }
    };

    Handled::Reply(reply)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use soundstreamer_core::endpoint::{AudioEndpoint, EndpointKind};
    use soundstreamer_core::ledger::LinkPair;
    use soundstreamer_core::state::DaemonState;

    use super::*;

    fn diagnostics() -> Diagnostics {
        Diagnostics {
            version: "0.1.0".into(),
            state: DaemonState::Running,
            monitor: "poll".into(),
            generation: 3,
            node_count: 4,
            port_count: 6,
            link_count: 1,
            created_links: 0,
            clients: 1,
            cleanup_on_exit: true,
        }
    }

    fn state() -> StateSnapshot {
        StateSnapshot {
            sources: vec![AudioEndpoint {
                id: 40,
                display_name: "Firefox - Song".into(),
                kind: EndpointKind::Source,
            }],
            ..StateSnapshot::default()
        }
    }

    #[test]
    fn test_queries_answer_from_snapshot() {
        let handled = handle_request(&Method::GetSources, &state(), &diagnostics());

        assert_matches!(handled, Handled::Reply(Ok(value)) if value[0]["display_name"] == "Firefox - Song");
    }

    #[test]
    fn test_diagnostics() {
        let handled = handle_request(&Method::GetDiagnostics, &state(), &diagnostics());

        assert_matches!(handled, Handled::Reply(Ok(value)) if value["generation"] == 3);
    }

    #[test]
    fn test_create_links_without_sources_is_rejected() {
        let method = Method::CreateLinks { sources: vec![], targets: vec![50] };

        let handled = handle_request(&method, &state(), &diagnostics());

        assert_matches!(
            handled,
            Handled::Reply(Err(ErrorInfo { code: 400, message }))
                if message == "Please select at least one source application"
        );
    }

    #[test]
    fn test_create_links_without_targets_is_rejected() {
        let method = Method::CreateLinks { sources: vec![40], targets: vec![] };

        let handled = handle_request(&method, &state(), &diagnostics());

        assert_matches!(
            handled,
            Handled::Reply(Err(ErrorInfo { code: 400, message }))
                if message == "Please select at least one target microphone"
        );
    }

    #[test]
    fn test_mutations_become_commands() {
        let method = Method::CreateLinks { sources: vec![40], targets: vec![50] };
        assert_matches!(
            handle_request(&method, &state(), &diagnostics()),
            Handled::Command(Command::CreateLinks { .. })
        );

        let method = Method::RemoveLinks { pairs: vec![LinkPair::nodes(40, 50)] };
        assert_matches!(
            handle_request(&method, &state(), &diagnostics()),
            Handled::Command(Command::RemoveLinks { .. })
        );
    }

    #[test]
    fn test_remove_nothing_is_rejected() {
        let handled = handle_request(&Method::RemoveLinks { pairs: vec![] }, &state(), &diagnostics());

        assert_matches!(handled, Handled::Reply(Err(ErrorInfo { code: 400, .. })));
    }

    #[test]
    fn test_unlink_unknown_id_is_not_found() {
        let handled = handle_request(&Method::UnlinkById { id: 9 }, &state(), &diagnostics());

        assert_matches!(handled, Handled::Reply(Err(ErrorInfo { code: 404, .. })));
    }
}
