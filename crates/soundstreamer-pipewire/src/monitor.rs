//! PipeWire graph monitoring.
//!
//! The polling monitor refreshes the mirror from `pw-dump` on a dedicated
//! thread and reports what changed as [`GraphEvent`]s.

use std::io;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub use soundstreamer_core::event::GraphEvent;

use crate::diff::diff;
use crate::mirror::GraphMirror;

/// Shortest accepted polling interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of the monitor event channel.
const EVENT_CAPACITY: usize = 256;

/// Handle to a running monitor thread.
///
/// Dropping the handle stops the monitor.
pub struct MonitorHandle {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Ask the monitor to stop and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Graph monitor thread panicked");
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Refreshes a [`GraphMirror`] at a fixed interval.
pub struct PollingMonitor {
    mirror: Arc<GraphMirror>,
    interval: Duration,
    event_tx: mpsc::Sender<GraphEvent>,
    /// Whether the last refresh reached PipeWire
    connected: bool,
}

impl PollingMonitor {
    /// Create a monitor. Intervals below [`MIN_INTERVAL`] are raised to it.
    #[must_use]
    pub fn new(
        mirror: Arc<GraphMirror>,
        interval: Duration,
        event_tx: mpsc::Sender<GraphEvent>,
    ) -> Self {
        let connected = mirror.generation() > 0;
        Self { mirror, interval: interval.max(MIN_INTERVAL), event_tx, connected }
    }

    /// Run one refresh and forward the resulting events.
    ///
    /// Returns `false` once the receiving side has gone away.
    pub fn poll_once(&mut self) -> bool {
        let old = self.mirror.snapshot();

        let events = match self.mirror.refresh() {
            Ok(new) => {
                let mut events = Vec::new();
                if !self.connected {
                    info!("PipeWire reachable again");
                    self.connected = true;
                    events.push(GraphEvent::Connected);
                }
                events.extend(diff(&old, &new));
                events
            }
            Err(e) if self.connected => {
                warn!(error = %e, "Graph refresh failed");
                self.connected = false;
                vec![GraphEvent::Disconnected { reason: e.to_string() }]
            }
            Err(e) => {
                debug!(error = %e, "Graph refresh still failing");
                Vec::new()
            }
        };

        for event in events {
            if self.event_tx.blocking_send(event).is_err() {
                debug!("Event receiver dropped");
                return false;
            }
        }
        true
    }

    fn run(mut self, stop_rx: &std_mpsc::Receiver<()>) {
        info!(interval_ms = self.interval.as_millis(), "Graph monitor started");

        loop {
            match stop_rx.recv_timeout(self.interval) {
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if !self.poll_once() {
                break;
            }
        }

        info!("Graph monitor stopped");
    }

    /// Run the monitor on its own thread.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(self) -> io::Result<MonitorHandle> {
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("pipewire-monitor".to_string())
            .spawn(move || self.run(&stop_rx))?;

        Ok(MonitorHandle { stop_tx: Some(stop_tx), thread: Some(thread) })
    }
}

/// Spawn a polling monitor and return its handle and event stream.
///
/// # Errors
/// Returns an error if the thread cannot be spawned.
pub fn spawn_monitor(
    mirror: Arc<GraphMirror>,
    interval: Duration,
) -> io::Result<(MonitorHandle, mpsc::Receiver<GraphEvent>)> {
    let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
    let handle = PollingMonitor::new(mirror, interval, tx).spawn()?;
    Ok((handle, rx))
}

#[cfg(test)]
mod tests {
    use soundstreamer_core::graph::LinkState;

    use super::*;
    use crate::cli::MockGraphBackend;
    use crate::dump::fixtures::STUDIO_DUMP;
    use crate::error::PwError;

    /// Backend replaying a script of `pw-dump` results, repeating the last.
    fn scripted(script: Vec<Option<String>>) -> Arc<GraphMirror> {
        let mut backend = MockGraphBackend::new();
        let mut step = 0;
        backend.expect_dump().returning(move || {
            let entry = script[step.min(script.len() - 1)].clone();
            step += 1;
            entry.ok_or_else(|| PwError::CommandFailed {
                tool: "pw-dump".into(),
                status: "exit status: 1".into(),
                stderr: "failed to connect".into(),
            })
        });
        Arc::new(GraphMirror::new(Arc::new(backend)))
    }

    #[test]
    fn test_poll_emits_diff_events() {
        let paused = STUDIO_DUMP.replace("\"state\": \"active\"", "\"state\": \"paused\"");
        let mirror = scripted(vec![Some(STUDIO_DUMP.to_string()), Some(paused)]);
        mirror.refresh().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let mut monitor = PollingMonitor::new(Arc::clone(&mirror), MIN_INTERVAL, tx);

        assert!(monitor.poll_once());

        assert_eq!(
            rx.try_recv().unwrap(),
            GraphEvent::LinkStateChanged { id: 200, state: LinkState::Paused }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(mirror.generation(), 2);
    }

    #[test]
    fn test_disconnect_reported_once_then_reconnect() {
        let studio = Some(STUDIO_DUMP.to_string());
        let mirror = scripted(vec![studio.clone(), None, None, studio]);
        mirror.refresh().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let mut monitor = PollingMonitor::new(Arc::clone(&mirror), MIN_INTERVAL, tx);

        for _ in 0..3 {
            assert!(monitor.poll_once());
        }

        assert!(matches!(rx.try_recv().unwrap(), GraphEvent::Disconnected { reason } if reason.contains("failed to connect")));
        assert_eq!(rx.try_recv().unwrap(), GraphEvent::Connected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_first_success_reports_connected() {
        let mirror = scripted(vec![Some(STUDIO_DUMP.to_string())]);
        let (tx, mut rx) = mpsc::channel(64);
        let mut monitor = PollingMonitor::new(mirror, MIN_INTERVAL, tx);

        assert!(monitor.poll_once());

        assert_eq!(rx.try_recv().unwrap(), GraphEvent::Connected);
        assert!(matches!(rx.try_recv().unwrap(), GraphEvent::NodeAdded(node) if node.id == 40));
    }

    #[test]
    fn test_stops_when_receiver_dropped() {
        let mirror = scripted(vec![Some(STUDIO_DUMP.to_string())]);
        let (tx, rx) = mpsc::channel(64);
        drop(rx);
        let mut monitor = PollingMonitor::new(mirror, MIN_INTERVAL, tx);

        assert!(!monitor.poll_once());
    }

    #[test]
    fn test_interval_is_clamped() {
        let mirror = scripted(vec![Some(STUDIO_DUMP.to_string())]);
        let (tx, _rx) = mpsc::channel(1);
        let monitor = PollingMonitor::new(mirror, Duration::from_millis(5), tx);

        assert_eq!(monitor.interval, MIN_INTERVAL);
    }

    #[test]
    fn test_spawned_monitor_stops_on_request() {
        let mirror = scripted(vec![Some(STUDIO_DUMP.to_string())]);
        let (handle, mut rx) = spawn_monitor(Arc::clone(&mirror), MIN_INTERVAL).unwrap();

        assert_eq!(rx.blocking_recv(), Some(GraphEvent::Connected));
        handle.stop();

        assert!(mirror.generation() >= 1);
    }
}
