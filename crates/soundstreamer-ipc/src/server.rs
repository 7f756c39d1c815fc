//! IPC server implementation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::error::IpcResult;
use crate::events::{Event, EventType};
use crate::messages::{ErrorInfo, Method, Request, Response};

/// Longest accepted request line.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// A request forwarded to the daemon: client ID, request, and where to reply.
pub type ClientRequest = (u64, Request, mpsc::Sender<Response>);

/// IPC server that listens for client connections.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    clients: Arc<RwLock<HashMap<u64, ClientHandle>>>,
    next_client_id: AtomicU64,
    event_tx: broadcast::Sender<Event>,
    request_tx: mpsc::Sender<ClientRequest>,
}

struct ClientHandle {
    subscriptions: HashSet<EventType>,
}

impl IpcServer {
    /// Create a new IPC server bound to the given socket path.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be created.
    pub async fn bind(socket_path: &Path) -> IpcResult<(Self, mpsc::Receiver<ClientRequest>)> {
        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stale socket from a previous run
        if socket_path.exists() {
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(?socket_path, "IPC server listening");

        let (event_tx, _) = broadcast::channel(256);
        let (request_tx, request_rx) = mpsc::channel(64);

        Ok((
            Self {
                listener,
                socket_path: socket_path.to_path_buf(),
                clients: Arc::new(RwLock::new(HashMap::new())),
                next_client_id: AtomicU64::new(1),
                event_tx,
                request_tx,
            },
            request_rx,
        ))
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                    info!(client_id, "Client connected");

                    let clients = Arc::clone(&self.clients);
                    let event_rx = self.event_tx.subscribe();
                    let request_tx = self.request_tx.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_client(client_id, stream, clients, event_rx, request_tx)
                                .await
                        {
                            error!(client_id, error = %e, "Client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                }
            }
        }
    }

    /// Broadcast an event to all subscribed clients.
    pub fn broadcast(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get a clone of the event sender for broadcasting from other tasks.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn handle_client(
        client_id: u64,
        stream: UnixStream,
        clients: Arc<RwLock<HashMap<u64, ClientHandle>>>,
        mut event_rx: broadcast::Receiver<Event>,
        request_tx: mpsc::Sender<ClientRequest>,
    ) -> IpcResult<()> {
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let (response_tx, mut response_rx) = mpsc::channel::<Response>(16);

        clients.write().await.insert(client_id, ClientHandle { subscriptions: HashSet::new() });

        let result: IpcResult<()> = loop {
            tokio::select! {
                line = framed.next() => {
                    let line = match line {
                        Some(Ok(line)) => line,
                        Some(Err(e)) => break Err(e.into()),
                        None => {
                            debug!(client_id, "Client disconnected");
                            break Ok(());
                        }
                    };

                    let request = match serde_json::from_str::<Request>(&line) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(client_id, error = %e, "Invalid request format");
                            let reply = Response::err(0, ErrorInfo::bad_request(format!("Invalid request: {e}")));
                            if let Err(e) = framed.send(serde_json::to_string(&reply)?).await {
                                break Err(e.into());
                            }
                            continue;
                        }
                    };
                    debug!(client_id, request_id = request.id, method = ?request.method, "Received request");

                    if let Some(reply) = Self::handle_subscription(client_id, &clients, &request).await {
                        if let Err(e) = framed.send(serde_json::to_string(&reply)?).await {
                            break Err(e.into());
                        }
                    } else if request_tx.send((client_id, request, response_tx.clone())).await.is_err() {
                        debug!(client_id, "Daemon stopped accepting requests");
                        break Ok(());
                    }
                }

                Some(response) = response_rx.recv() => {
                    if let Err(e) = framed.send(serde_json::to_string(&response)?).await {
                        break Err(e.into());
                    }
                }

                event = event_rx.recv() => {
                    let event = match event {
                        Ok(event) => event,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(client_id, missed, "Client is lagging, events dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => break Ok(()),
                    };
                    let subscribed = clients
                        .read()
                        .await
                        .get(&client_id)
                        .is_some_and(|c| c.subscriptions.contains(&event.event));
                    if subscribed && let Err(e) = framed.send(serde_json::to_string(&event)?).await {
                        break Err(e.into());
                    }
                }
            }
        };

        clients.write().await.remove(&client_id);

        info!(client_id, "Client handler exiting");
        result
    }

    /// Subscriptions are per connection and answered here.
    async fn handle_subscription(
        client_id: u64,
        clients: &RwLock<HashMap<u64, ClientHandle>>,
        request: &Request,
    ) -> Option<Response> {
        let (events, subscribe) = match &request.method {
            Method::Subscribe { events } => (events, true),
            Method::Unsubscribe { events } => (events, false),
            _ => return None,
        };

        let types = if events.is_empty() {
            EventType::ALL.to_vec()
        } else {
            let mut types = Vec::with_capacity(events.len());
            for name in events {
                match EventType::from_name(name) {
                    Some(ty) => types.push(ty),
                    None => {
                        return Some(Response::err(
                            request.id,
                            ErrorInfo::bad_request(format!("Unknown event type: {name}")),
                        ));
                    }
                }
            }
            types
        };

        let mut clients = clients.write().await;
        let handle = clients.get_mut(&client_id)?;
        if subscribe {
            handle.subscriptions.extend(types);
        } else {
            for ty in &types {
                handle.subscriptions.remove(ty);
            }
        }
        debug!(client_id, subscriptions = ?handle.subscriptions, "Subscriptions updated");

        Some(Response::ok(request.id, json!({"success": true})))
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
