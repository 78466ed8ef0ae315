//! LSP client transport: spawns a language server, frames JSON-RPC over its
//! stdio, correlates requests with responses, runs the initialize/shutdown
//! handshake and answers the server's own requests.
//!
//! Feature payloads (diagnostics, completions, hovers) are passed through as
//! opaque JSON.

pub mod codec;
pub mod config;
pub mod protocol;
pub mod types;

pub(crate) mod dispatch;
pub(crate) mod documents;
pub(crate) mod process;
pub(crate) mod registry;
pub(crate) mod router;
pub(crate) mod session;

mod client;

pub use client::LspClient;
pub use config::{ClientConfig, ConfigError, LspConfig, ServerConfig};
pub use protocol::{METHOD_NOT_FOUND, PROCESS_NOT_RUNNING, ResponseError};
pub use registry::ResponseHandler;
pub use types::{ClientEvent, RequestError, SessionState, StartError};
