//! IPC client implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, warn};

use crate::error::{IpcError, IpcResult};
use crate::events::Event;
use crate::messages::{Method, Request, Response};

/// How long to wait for the daemon to answer a request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// IPC client for connecting to the SoundStreamer daemon.
pub struct IpcClient {
    writer: Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    next_id: AtomicU64,
    pending: Pending,
    event_rx: mpsc::Receiver<Event>,
}

impl IpcClient {
    /// Connect to the daemon at the given socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(socket_path: &Path) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (reader, writer) = stream.into_split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(64);

        let pending_reader = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = FramedRead::new(reader, LinesCodec::new());

            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "Read error");
                        break;
                    }
                };

                if let Ok(response) = serde_json::from_str::<Response>(&line) {
                    if let Some(tx) = pending_reader.lock().await.remove(&response.id) {
                        let _ = tx.send(response);
                    }
                } else if let Ok(event) = serde_json::from_str::<Event>(&line) {
                    // Events nobody reads are dropped rather than stalling responses
                    if event_tx.try_send(event).is_err() {
                        debug!("Event dropped, receiver full or closed");
                    }
                } else {
                    warn!("Unknown message format");
                }
            }

            debug!("Connection closed");
            pending_reader.lock().await.clear();
        });

        Ok(Self {
            writer: Mutex::new(FramedWrite::new(writer, LinesCodec::new())),
            next_id: AtomicU64::new(1),
            pending,
            event_rx,
        })
    }

    /// Send a request and wait for a response.
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent, the connection closes,
    /// or the daemon does not answer within [`REQUEST_TIMEOUT`].
    pub async fn request(&self, method: Method) -> IpcResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request { id, method };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        self.writer.lock().await.send(json).await?;

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(IpcError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(IpcError::Timeout)
            }
        }
    }

    /// Send a request and unwrap the daemon's result.
    ///
    /// # Errors
    /// As [`request`](Self::request), plus [`IpcError::Server`] when the
    /// daemon answers with an error.
    pub async fn call(&self, method: Method) -> IpcResult<Value> {
        self.request(method)
            .await?
            .result
            .map_err(|e| IpcError::Server { code: e.code, message: e.message })
    }

    /// Get the event receiver for incoming events.
    pub fn events(&mut self) -> &mut mpsc::Receiver<Event> {
        &mut self.event_rx
    }
}
