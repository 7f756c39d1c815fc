//! PipeWire error types.

use thiserror::Error;

/// PipeWire error type.
#[derive(Debug, Error)]
pub enum PwError {
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    CommandFailed { tool: String, status: String, stderr: String },

    #[error("Could not parse pw-dump output: {0}")]
    DumpParse(#[from] serde_json::Error),

    #[error("Link creation failed: {0}")]
    LinkCreationFailed(String),

    #[error("Link removal failed: {0}")]
    LinkRemovalFailed(String),

    #[error("Node not found: {0}")]
    NodeNotFound(u32),

    #[error("Port not found: {0}")]
    PortNotFound(u32),

    #[error("Link not found: {0}")]
    LinkNotFound(u32),

    #[error("Port {port} is not an {expected} port")]
    InvalidDirection { port: u32, expected: &'static str },

    #[error("Required PipeWire utilities not found: {}. Please install pipewire-tools package.", .0.join(", "))]
    MissingTools(Vec<String>),

    #[error("PipeWire connection failed: {0}")]
    ConnectionFailed(String),

    #[error("MainLoop error: {0}")]
    MainLoopError(String),
}

/// Result type for PipeWire operations.
pub type PwResult<T> = Result<T, PwError>;
