//! Public types shared between the client and its caller.
//!
//! The caller receives [`ClientEvent`]s, observes [`SessionState`], and gets
//! [`StartError`] / [`RequestError`] back from the call interface.

use serde_json::Value;

use crate::protocol::ResponseError;

/// An event emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Readiness changed. `true` once the initialize handshake completed,
    /// `false` when a ready session ends.
    Ready(bool),
    /// A line of diagnostic text: server stderr, `window/logMessage`,
    /// `window/showMessage`, stray stdout, or a lifecycle failure.
    Log(String),
    /// Diagnostics published for a document, passed through unmodified.
    Diagnostics { uri: String, diagnostics: Vec<Value> },
}

/// Lifecycle of a protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    NotStarted,
    /// Process spawned, `initialize` in flight.
    Starting,
    Ready,
    /// `shutdown`/`exit` sent, waiting for the process to go away.
    ShuttingDown,
    Stopped,
}

impl SessionState {
    /// Whether a server process may still be talking to us.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Ready | Self::ShuttingDown)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting down",
            Self::Stopped => "stopped",
        }
    }
}

/// Why the server's output stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStopReason {
    Exited,
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("{command} not found in PATH")]
    NotFound {
        command: String,
        #[source]
        source: which::Error,
    },
    #[error("spawning {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no {0} from child")]
    MissingPipe(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The server (or the client, for a request it could not send) replied
    /// with an error object.
    #[error("request failed: {0}")]
    Response(#[from] ResponseError),
    /// The session was stopped before a response arrived.
    #[error("session stopped before a response arrived")]
    Dropped,
}

impl RequestError {
    /// The JSON-RPC error code, when there is one.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Response(error) => Some(error.code),
            Self::Dropped => None,
        }
    }
}
