//! SoundStreamer Daemon - routes application audio into microphones.
//!
//! This is the main entry point for the SoundStreamer daemon, which mirrors
//! the PipeWire graph, creates links on behalf of its clients, and removes
//! them again when the session ends.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod server;
mod signals;

use config::{Config, ConfigSource, DaemonConfig, LogFormat, MonitorConfig, MonitorMode};
use server::Handled;
use signals::SignalAction;
use soundstreamer_core::Command;
use soundstreamer_core::state::{DaemonState, StateSnapshot};
use soundstreamer_ipc::{
    Diagnostics, DisconnectedData, ErrorData, ErrorInfo, Event, EventType, GraphChangedData, IpcServer,
    Method, Response, StateChangedData, socket_path,
};
use soundstreamer_pipewire::diff::diff;
use soundstreamer_pipewire::{
    CleanupReport, GraphEvent, GraphMirror, MonitorHandle, PwCli, ensure_tools, spawn_monitor,
};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = config::load_config()?;
    init_logging(&config.daemon)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting SoundStreamer daemon");
    match source {
        ConfigSource::File(path) => info!(?path, "Loaded config file"),
        ConfigSource::Defaults(path) => info!(?path, "Config file not found, using defaults"),
    }

    let tools = config.tools.paths();
    ensure_tools(&tools)?;
    info!("PipeWire tools found");

    let mirror = Arc::new(GraphMirror::new(Arc::new(PwCli::new(tools))));

    // Start IPC server
    let socket = socket_path();
    info!(?socket, "Starting IPC server");
    let (ipc_server, mut request_rx) =
        IpcServer::bind(&socket).await.context("Failed to start IPC server")?;
    let ipc_server = Arc::new(ipc_server);
    let event_tx = ipc_server.event_sender();

    let mut daemon = Daemon::new(Arc::clone(&mirror), config, event_tx, Arc::clone(&ipc_server));

    // Initial snapshot; PipeWire being down is not fatal, the monitor retries
    match daemon.refresh().await {
        Ok(_) => {
            let graph = mirror.snapshot();
            info!(
                nodes = graph.node_count(),
                sources = mirror.sources().len(),
                targets = mirror.targets().len(),
                "Initial graph loaded"
            );
        }
        Err(e) => warn!(error = %e, "Initial graph refresh failed"),
    }

    let (monitor, mut graph_event_rx) = start_monitor(&daemon.config.monitor, Arc::clone(&mirror))?;
    daemon.monitor_name = monitor.name();

    let ipc_runner = Arc::clone(&ipc_server);
    let ipc_handle = tokio::spawn(async move {
        ipc_runner.run().await;
    });

    let mut signal_rx = signals::setup_signal_handlers()?;

    info!("Daemon running. Press Ctrl+C to exit.");

    let mut monitor_running = true;
    loop {
        tokio::select! {
            // Handle graph monitor events
            event = graph_event_rx.recv(), if monitor_running => {
                if let Some(event) = event {
                    let mut changes = 0;
                    let mut next = Some(event);
                    while let Some(event) = next {
                        if event.is_graph_change() {
                            debug!(?event, "Graph event");
                            changes += 1;
                        } else {
                            daemon.on_connection_event(event);
                        }
                        next = graph_event_rx.try_recv().ok();
                    }
                    if changes > 0 {
                        daemon.on_graph_changed(changes);
                    }
                } else {
                    monitor_running = false;
                    daemon.on_monitor_stopped();
                }
            }

            // Handle IPC requests
            Some((client_id, request, response_tx)) = request_rx.recv() => {
                if request.method.is_mutation() {
                    info!(client_id, request_id = request.id, method = ?request.method, "Handling IPC request");
                } else {
                    debug!(client_id, request_id = request.id, method = ?request.method, "Handling IPC request");
                }

                let (result, shutdown) = daemon.handle(&request.method).await;
                let _ = response_tx.send(Response { id: request.id, result }).await;

                if shutdown {
                    info!("Shutdown command processed");
                    break;
                }
            }

            Some(action) = signal_rx.recv() => match action {
                SignalAction::Shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                SignalAction::Refresh => {
                    if let Err(e) = daemon.refresh().await {
                        warn!(error = %e, "Refresh failed");
                    }
                }
            },
        }
    }

    // Cleanup
    info!("Shutting down...");
    daemon.set_state(DaemonState::ShuttingDown);
    // A full event channel would block the monitor thread
    drop(graph_event_rx);
    monitor.stop();

    daemon.cleanup().await;

    ipc_handle.abort();
    drop(daemon);
    drop(ipc_server);

    info!("SoundStreamer daemon stopped");
    Ok(())
}

fn init_logging(config: &DaemonConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("Invalid log level: {}", config.log_level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

/// The graph monitor that is running.
enum ActiveMonitor {
    Poll(MonitorHandle),
    #[cfg(feature = "native")]
    Native(soundstreamer_pipewire::NativeMonitor),
}

impl ActiveMonitor {
    fn name(&self) -> &'static str {
        match self {
            Self::Poll(_) => "poll",
            #[cfg(feature = "native")]
            Self::Native(_) => "native",
        }
    }

    fn stop(self) {
        match self {
            Self::Poll(handle) => handle.stop(),
            #[cfg(feature = "native")]
            Self::Native(monitor) => monitor.stop(),
        }
    }
}

fn start_monitor(
    config: &MonitorConfig,
    mirror: Arc<GraphMirror>,
) -> Result<(ActiveMonitor, mpsc::Receiver<GraphEvent>)> {
    if config.mode == MonitorMode::Native {
        #[cfg(feature = "native")]
        {
            let (monitor, rx) = soundstreamer_pipewire::NativeMonitor::spawn(mirror)
                .context("Failed to spawn native graph monitor")?;
            info!("Native graph monitor started");
            return Ok((ActiveMonitor::Native(monitor), rx));
        }
        #[cfg(not(feature = "native"))]
        warn!("Native monitor not compiled in, falling back to polling");
    }

    let (handle, rx) =
        spawn_monitor(mirror, config.interval()).context("Failed to spawn graph monitor")?;
    Ok((ActiveMonitor::Poll(handle), rx))
}

/// State owned by the main loop.
struct Daemon {
    mirror: Arc<GraphMirror>,
    config: Config,
    state: DaemonState,
    event_tx: broadcast::Sender<Event>,
    ipc: Arc<IpcServer>,
    monitor_name: &'static str,
}

impl Daemon {
    fn new(
        mirror: Arc<GraphMirror>,
        config: Config,
        event_tx: broadcast::Sender<Event>,
        ipc: Arc<IpcServer>,
    ) -> Self {
        Self {
            mirror,
            config,
            state: DaemonState::Initializing,
            event_tx,
            ipc,
            monitor_name: "none",
        }
    }

    fn broadcast(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&mut self, state: DaemonState) {
        if self.state == state {
            return;
        }
        info!(from = ?self.state, to = ?state, "Daemon state changed");
        self.state = state;
        self.broadcast(Event::new(EventType::StateChanged, &StateChangedData { state: self.state.clone() }));
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::build(
            self.state.clone(),
            &self.mirror.snapshot(),
            &self.mirror.created_links(),
            self.mirror.generation(),
        )
    }

    async fn diagnostics(&self) -> Diagnostics {
        let graph = self.mirror.snapshot();
        Diagnostics {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: self.state.clone(),
            monitor: self.monitor_name.to_string(),
            generation: self.mirror.generation(),
            node_count: graph.node_count(),
            port_count: graph.port_count(),
            link_count: graph.link_count(),
            created_links: self.mirror.created_links().len(),
            clients: self.ipc.client_count().await,
            cleanup_on_exit: self.config.daemon.cleanup_on_exit,
        }
    }

    /// Track PipeWire reachability. A daemon in `Error` stays there.
    fn set_connection_state(&mut self, state: DaemonState) {
        if matches!(self.state, DaemonState::Error(_) | DaemonState::ShuttingDown) {
            return;
        }
        self.set_state(state);
    }

    fn on_monitor_stopped(&mut self) {
        error!("Graph monitor stopped, the graph is only updated on refresh");
        self.set_state(DaemonState::Error("Graph monitor stopped".to_string()));
    }

    fn on_connection_event(&mut self, event: GraphEvent) {
        match event {
            GraphEvent::Connected => {
                info!("PipeWire connected");
                self.set_connection_state(DaemonState::Running);
                self.broadcast(Event::new(EventType::PipewireConnected, &serde_json::json!({})));
            }
            GraphEvent::Disconnected { reason } => {
                warn!(reason = %reason, "PipeWire disconnected");
                self.set_connection_state(DaemonState::Disconnected);
                self.broadcast(Event::new(EventType::PipewireDisconnected, &DisconnectedData { reason }));
            }
            other => debug!(?other, "Ignoring graph event"),
        }
    }

    fn on_graph_changed(&mut self, changes: usize) {
        let forgotten = self.mirror.reconcile();
        if !forgotten.is_empty() {
            debug!(count = forgotten.len(), "Session links vanished from the graph");
        }

        let graph = self.mirror.snapshot();
        self.broadcast(Event::new(
            EventType::GraphChanged,
            &GraphChangedData {
                generation: self.mirror.generation(),
                changes,
                sources: self.mirror.sources().len(),
                targets: self.mirror.targets().len(),
                links: graph.link_count(),
            },
        ));
    }

    /// Re-read the graph and publish what changed.
    async fn refresh(&mut self) -> Result<usize> {
        let old = self.mirror.snapshot();
        let mirror = Arc::clone(&self.mirror);
        let result = tokio::task::spawn_blocking(move || mirror.refresh())
            .await
            .context("Refresh task failed")?;

        match result {
            Ok(new) => {
                self.set_connection_state(DaemonState::Running);
                let changes = diff(&old, &new).len();
                if changes > 0 {
                    self.on_graph_changed(changes);
                }
                Ok(changes)
            }
            Err(e) => {
                self.set_connection_state(DaemonState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Answer a request. Returns the result and whether to shut down.
    async fn handle(&mut self, method: &Method) -> (Result<serde_json::Value, ErrorInfo>, bool) {
        let snapshot = self.snapshot();
        let diagnostics = self.diagnostics().await;

        let command = match server::handle_request(method, &snapshot, &diagnostics) {
            Handled::Reply(result) => return (result, false),
            Handled::Command(command) => command,
        };

        if let Err(e) = check_available(&self.state, &command) {
            return (Err(e), false);
        }

        let is_refresh = matches!(command, Command::Refresh);
        let old = self.mirror.snapshot();
        let mirror = Arc::clone(&self.mirror);
        let outcome = match tokio::task::spawn_blocking(move || commands::execute(&mirror, command)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Command task failed");
                return (Err(ErrorInfo::new(ErrorInfo::INTERNAL, e.to_string())), false);
            }
        };

        for event in outcome.events {
            self.broadcast(event);
        }

        if is_refresh && outcome.result.is_ok() {
            self.set_connection_state(DaemonState::Running);
        }

        if let Err(e) = &outcome.result {
            self.broadcast(Event::new(
                EventType::Error,
                &ErrorData { code: e.code, message: e.message.clone(), source: "command".into() },
            ));
        }

        if outcome.graph_touched {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Refresh after command failed");
            }
        } else {
            let changes = diff(&old, &self.mirror.snapshot()).len();
            if changes > 0 {
                self.on_graph_changed(changes);
            }
        }

        (outcome.result, outcome.shutdown)
    }

    /// Remove the session's links if configured to. Returns `None` when the
    /// links are kept or the cleanup task failed.
    async fn cleanup(&self) -> Option<CleanupReport> {
        if !self.config.daemon.cleanup_on_exit {
            info!(kept = self.mirror.created_links().len(), "Keeping session links");
            return None;
        }

        let mirror = Arc::clone(&self.mirror);
        match tokio::task::spawn_blocking(move || mirror.remove_all_links()).await {
            Ok(report) => {
                if !report.failed.is_empty() {
                    warn!(
                        removed = report.removed.len(),
                        failed = report.failed.len(),
                        "Some session links could not be removed"
                    );
                }
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Link cleanup task failed");
                None
            }
        }
    }
}

/// Mutations need PipeWire; only `Refresh` and `Shutdown` run while it is
/// unreachable.
fn check_available(state: &DaemonState, command: &Command) -> Result<(), ErrorInfo> {
    match state {
        DaemonState::Disconnected if !matches!(command, Command::Refresh | Command::Shutdown) => {
            Err(ErrorInfo::new(ErrorInfo::UNAVAILABLE, "PipeWire is not reachable"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use mockall::predicate::eq;
    use soundstreamer_core::ledger::LinkPair;
    use soundstreamer_pipewire::{MockGraphBackend, PwError};
    use tempfile::TempDir;

    use super::*;
    use crate::commands::fixtures::DUMP;

    struct Harness {
        daemon: Daemon,
        events: broadcast::Receiver<Event>,
        _dir: TempDir,
    }

    async fn harness(backend: MockGraphBackend, config: Config) -> Harness {
        let dir = TempDir::new().unwrap();
        let (server, _requests) = IpcServer::bind(&dir.path().join("daemon.sock")).await.unwrap();
        let events = server.event_sender().subscribe();
        let mirror = Arc::new(GraphMirror::new(Arc::new(backend)));
        let daemon = Daemon::new(mirror, config, server.event_sender(), Arc::new(server));
        Harness { daemon, events, _dir: dir }
    }

    fn pipewire_down() -> PwError {
        PwError::CommandFailed {
            tool: "pw-dump".into(),
            status: "exit status: 1".into(),
            stderr: "can't connect: Host is down".into(),
        }
    }

    #[tokio::test]
    async fn test_mutations_rejected_while_disconnected() {
        let mut backend = MockGraphBackend::new();
        backend.expect_dump().returning(|| Err(pipewire_down()));
        backend.expect_link().never();
        let mut h = harness(backend, Config::default()).await;

        assert!(h.daemon.refresh().await.is_err());
        assert_eq!(h.daemon.state, DaemonState::Disconnected);

        let method = Method::CreateLinks { sources: vec![41], targets: vec![50] };
        let (result, shutdown) = h.daemon.handle(&method).await;

        assert_matches!(result, Err(ErrorInfo { code: 503, .. }));
        assert!(!shutdown);
        // Queries still answer from the last snapshot
        assert_matches!(h.daemon.handle(&Method::GetSources).await, (Ok(_), false));
    }

    #[tokio::test]
    async fn test_refresh_allowed_while_disconnected() {
        let mut backend = MockGraphBackend::new();
        let mut calls = 0;
        backend.expect_dump().returning(move || {
            calls += 1;
            if calls == 1 { Err(pipewire_down()) } else { Ok(DUMP.to_string()) }
        });
        let mut h = harness(backend, Config::default()).await;
        assert!(h.daemon.refresh().await.is_err());

        let (result, shutdown) = h.daemon.handle(&Method::Refresh).await;

        assert!(result.is_ok());
        assert!(!shutdown);
        assert_eq!(h.daemon.state, DaemonState::Running);
        assert_eq!(h.daemon.mirror.sources().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_allowed_while_disconnected() {
        let mut backend = MockGraphBackend::new();
        backend.expect_dump().returning(|| Err(pipewire_down()));
        let mut h = harness(backend, Config::default()).await;
        assert!(h.daemon.refresh().await.is_err());

        assert_matches!(h.daemon.handle(&Method::Shutdown).await, (Ok(_), true));
    }

    #[test]
    fn test_availability_gate() {
        let disconnected = DaemonState::Disconnected;

        assert!(check_available(&disconnected, &Command::Refresh).is_ok());
        assert!(check_available(&disconnected, &Command::Shutdown).is_ok());
        assert_matches!(
            check_available(&disconnected, &Command::RemoveAllLinks),
            Err(ErrorInfo { code: 503, .. })
        );
        assert!(check_available(&DaemonState::Running, &Command::RemoveAllLinks).is_ok());
    }

    #[tokio::test]
    async fn test_connection_events_change_state() {
        let mut h = harness(MockGraphBackend::new(), Config::default()).await;

        h.daemon.on_connection_event(GraphEvent::Disconnected { reason: "pw-dump failed".into() });

        assert_eq!(h.daemon.state, DaemonState::Disconnected);
        let state = h.events.try_recv().unwrap();
        assert_eq!(state.event, EventType::StateChanged);
        assert_eq!(state.data["state"], "disconnected");
        let lost = h.events.try_recv().unwrap();
        assert_eq!(lost.event, EventType::PipewireDisconnected);
        assert_eq!(lost.data["reason"], "pw-dump failed");

        h.daemon.on_connection_event(GraphEvent::Connected);

        assert_eq!(h.daemon.state, DaemonState::Running);
        assert_eq!(h.events.try_recv().unwrap().event, EventType::StateChanged);
        assert_eq!(h.events.try_recv().unwrap().event, EventType::PipewireConnected);
    }

    #[tokio::test]
    async fn test_stopped_monitor_is_an_error_state() {
        let mut backend = MockGraphBackend::new();
        backend.expect_dump().returning(|| Ok(DUMP.to_string()));
        let mut h = harness(backend, Config::default()).await;

        h.daemon.on_monitor_stopped();
        h.daemon.refresh().await.unwrap();
        h.daemon.on_connection_event(GraphEvent::Connected);

        assert_matches!(&h.daemon.state, DaemonState::Error(msg) if msg == "Graph monitor stopped");
    }

    #[tokio::test]
    async fn test_cleanup_removes_session_links() {
        let mut backend = MockGraphBackend::new();
        // pw-link has not shown up in the dump that follows the command
        backend.expect_dump().returning(|| Ok(DUMP.to_string()));
        backend.expect_link().with(eq(41), eq(50)).times(1).returning(|_, _| Ok(()));
        backend.expect_unlink().with(eq(41), eq(50)).times(1).returning(|_, _| Ok(()));
        let mut h = harness(backend, Config::default()).await;
        h.daemon.refresh().await.unwrap();

        let method = Method::CreateLinks { sources: vec![41], targets: vec![50] };
        assert_matches!(h.daemon.handle(&method).await, (Ok(_), false));
        assert_eq!(h.daemon.mirror.created_links(), vec![LinkPair::nodes(41, 50)]);

        let report = h.daemon.cleanup().await.unwrap();

        assert_eq!(report.removed, vec![LinkPair::nodes(41, 50)]);
        assert!(h.daemon.mirror.created_links().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_disabled_keeps_links() {
        let mut backend = MockGraphBackend::new();
        backend.expect_dump().returning(|| Ok(DUMP.to_string()));
        backend.expect_link().returning(|_, _| Ok(()));
        backend.expect_unlink().never();
        let mut config = Config::default();
        config.daemon.cleanup_on_exit = false;
        let mut h = harness(backend, config).await;
        h.daemon.refresh().await.unwrap();
        h.daemon.handle(&Method::CreateLinks { sources: vec![41], targets: vec![50] }).await;

        assert!(h.daemon.cleanup().await.is_none());
        assert_eq!(h.daemon.mirror.created_links().len(), 1);
    }
}
