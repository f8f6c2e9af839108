//! # extension-bridge
//!
//! Bidirectional streaming bridge to out-of-process extensions.
//!
//! Third parties contribute framework or deployment-target plug-ins as
//! separate processes. The orchestrator holds one message stream per
//! extension and multiplexes request/response pairs over it: every message
//! carries a client-generated request id, a single receive loop routes each
//! incoming message to the bounded channel registered for its id, and
//! callers wait for the response satisfying their predicate while progress
//! messages are forwarded to their progress sink.

mod console;
mod mux;
mod protocol;
mod transport;

pub use console::{ConsoleBridge, ConsoleGuard};
pub use mux::{ExtensionBridge, PROGRESS_BURST_BUDGET};
pub use protocol::{ErrorInfo, ExtensionMessage, MessageBody};
pub use transport::{ExtensionListener, connect};

use thiserror::Error;

/// Bridge error types
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The extension stream terminated while requests were outstanding
    #[error("extension stream closed")]
    StreamClosed,

    /// The extension reported an error for this request
    #[error("{message}")]
    Extension {
        /// Error message, surfaced verbatim
        message: String,
        /// Optional machine-readable code
        code: Option<String>,
    },

    /// The extension violated the message contract
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Wire mapping failed
    #[error(transparent)]
    Wire(#[from] deploy_model::Error),

    /// Message serialization failed
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller's context was cancelled
    #[error("bridge call cancelled")]
    Cancelled,

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BridgeError>;
