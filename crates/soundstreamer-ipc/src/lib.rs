//! SoundStreamer IPC - Unix socket protocol and client library.
//!
//! This crate defines the communication protocol between the daemon and its
//! clients, as well as providing a client library for connecting to the daemon.
//! Messages are single JSON documents, one per line.

pub mod client;
pub mod error;
pub mod events;
pub mod messages;
pub mod server;

pub use client::IpcClient;
pub use error::{IpcError, IpcResult};
pub use events::{
    DisconnectedData, ErrorData, Event, EventType, GraphChangedData, LinksCreatedData,
    LinksRemovedData, StateChangedData,
};
pub use messages::{
    Diagnostics, ErrorInfo, LinkFailure, LinkReport, Method, RemoveReport, Request, Response,
};
pub use server::{ClientRequest, IpcServer};

use std::path::PathBuf;

/// Get the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/soundstreamer/daemon.sock` or falls back to
/// `/run/user/$UID/soundstreamer/daemon.sock`.
#[must_use]
#[allow(unsafe_code)] // libc::getuid() is safe to call
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("soundstreamer/daemon.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}/soundstreamer/daemon.sock"))
    }
}
