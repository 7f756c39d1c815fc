//! Signal handling.
//!
//! SIGTERM and SIGINT shut the daemon down (removing session links when
//! configured); SIGHUP forces a graph refresh.

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::info;

/// What a received signal asks the daemon to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Shutdown,
    Refresh,
}

/// Set up signal handlers.
///
/// Returns a receiver yielding one [`SignalAction`] per signal received.
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<SignalAction>> {
    let (tx, rx) = mpsc::channel(4);

    let handlers = [
        (SignalKind::terminate(), "SIGTERM", SignalAction::Shutdown),
        (SignalKind::interrupt(), "SIGINT", SignalAction::Shutdown),
        (SignalKind::hangup(), "SIGHUP", SignalAction::Refresh),
    ];

    for (kind, name, action) in handlers {
        let mut stream =
            signal(kind).with_context(|| format!("Failed to install {name} handler"))?;
        let tx = tx.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                info!(signal = name, "Received signal");
                if tx.send(action).await.is_err() {
                    break;
                }
            }
        });
    }

    Ok(rx)
}
