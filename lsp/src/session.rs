//! Protocol session state machine.
//!
//! A [`ProtocolSession`] owns everything that belongs to one connection:
//! the lifecycle state, the id counter, the pending-request table, document
//! versions and the inbound framing buffer. It performs no I/O; every
//! inbound chunk produces a [`Dispatch`] describing what the caller must
//! write, which handlers to run and which events to emit.
//!
//! ```text
//! NotStarted ──begin()──▶ Starting ──initialize ok──▶ Ready
//!                            │                          │
//!                     initialize error            begin_shutdown()
//!                   or begin_shutdown()                 │
//!                            ▼                          ▼
//!                         (abort) ──finish()──▶ Stopped ◀── ShuttingDown
//! ```

use serde_json::{Map, Value};

use crate::codec::{Decoded, FrameDecoder};
use crate::dispatch;
use crate::documents::DocumentVersions;
use crate::protocol::{self, Incoming, Notification, Outbound, Request, Response, ResponseError};
use crate::registry::{PendingRequests, ResponseHandler};
use crate::router;
use crate::types::{ClientEvent, SessionState};

/// Work produced by feeding bytes into a session.
///
/// `outbound` and `events` must be delivered before the session lock is
/// released, so replies keep their order relative to later requests and a
/// `Ready(true)` can never be overtaken by the teardown's `Ready(false)`.
/// Handlers run afterwards.
#[derive(Default)]
pub(crate) struct Dispatch {
    pub outbound: Vec<Outbound>,
    pub completions: Vec<(ResponseHandler, Result<Value, ResponseError>)>,
    pub events: Vec<ClientEvent>,
    /// The initialize handshake failed; the session must be stopped.
    pub abort: bool,
}

#[derive(Debug)]
pub(crate) struct ProtocolSession {
    state: SessionState,
    generation: u64,
    root_uri: Option<String>,
    next_id: u64,
    initialize_id: Option<u64>,
    pending: PendingRequests,
    documents: DocumentVersions,
    decoder: FrameDecoder,
    server_capabilities: Option<Value>,
}

impl Default for ProtocolSession {
    fn default() -> Self {
        Self {
            state: SessionState::NotStarted,
            generation: 0,
            root_uri: None,
            next_id: 1,
            initialize_id: None,
            pending: PendingRequests::default(),
            documents: DocumentVersions::default(),
            decoder: FrameDecoder::new(),
            server_capabilities: None,
        }
    }
}

impl ProtocolSession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Identifies the current session; bumped by every [`begin`](Self::begin).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether I/O from the process started for `generation` still belongs
    /// to this session.
    pub fn accepts(&self, generation: u64) -> bool {
        self.generation == generation && self.state.is_live()
    }

    pub fn root_uri(&self) -> Option<&str> {
        self.root_uri.as_deref()
    }

    pub fn server_capabilities(&self) -> Option<&Value> {
        self.server_capabilities.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn document_version(&self, uri: &str) -> Option<i32> {
        self.documents.version(uri)
    }

    /// Start a fresh session: everything from the previous one is dropped.
    pub fn begin(&mut self, root_uri: &str) -> u64 {
        self.clear();
        self.generation += 1;
        self.state = SessionState::Starting;
        self.root_uri = Some(root_uri.to_string()).filter(|uri| !uri.is_empty());
        self.generation
    }

    /// Build the `initialize` request and remember its id.
    pub fn initialize(&mut self) -> Outbound {
        let id = self.allocate_id();
        self.initialize_id = Some(id);
        let params = protocol::initialize_params(self.root_uri.as_deref());
        Request::new(id, "initialize", Some(params)).into()
    }

    /// Build a request, tracking `handler` when one is given.
    pub fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
        handler: Option<ResponseHandler>,
    ) -> (u64, Outbound) {
        let id = self.allocate_id();
        if let Some(handler) = handler {
            self.pending.insert(id, handler);
        }
        (id, Request::new(id, method, params).into())
    }

    pub fn did_open(&mut self, uri: &str, language_id: &str, text: &str) -> Option<Outbound> {
        if !self.is_ready() {
            return None;
        }
        let version = self.documents.open(uri);
        let params = protocol::did_open_params(uri, language_id, version, text);
        Some(Notification::new("textDocument/didOpen", Some(params)).into())
    }

    pub fn did_change(&mut self, uri: &str, text: &str) -> Option<Outbound> {
        if !self.is_ready() {
            return None;
        }
        let version = self.documents.change(uri);
        let params = protocol::did_change_params(uri, version, text);
        Some(Notification::new("textDocument/didChange", Some(params)).into())
    }

    pub fn did_close(&mut self, uri: &str) -> Option<Outbound> {
        if !self.is_ready() {
            return None;
        }
        self.documents.close(uri);
        let params = protocol::did_close_params(uri);
        Some(Notification::new("textDocument/didClose", Some(params)).into())
    }

    pub fn did_save(&self, uri: &str, text: &str) -> Option<Outbound> {
        if !self.is_ready() {
            return None;
        }
        let params = protocol::did_save_params(uri, text);
        Some(Notification::new("textDocument/didSave", Some(params)).into())
    }

    /// Enter ShuttingDown. From Ready, returns the `shutdown` request
    /// (untracked) and the `exit` notification to send before the process
    /// is terminated. From Starting, nothing is sent and a late `initialize`
    /// response can no longer make the session ready.
    pub fn begin_shutdown(&mut self) -> Vec<Outbound> {
        let was_ready = self.is_ready();
        self.state = SessionState::ShuttingDown;
        self.initialize_id = None;
        if !was_ready {
            return Vec::new();
        }
        let (_, shutdown) = self.request("shutdown", None, None);
        vec![shutdown, Notification::new("exit", None).into()]
    }

    /// End the session. Pending handlers are dropped without being invoked.
    pub fn finish(&mut self) {
        self.clear();
        self.state = SessionState::Stopped;
    }

    /// Feed a chunk of server stdout.
    pub fn receive(&mut self, chunk: &[u8]) -> Dispatch {
        let mut dispatch = Dispatch::default();
        for decoded in self.decoder.push(chunk) {
            match decoded {
                Decoded::Message(frame) => self.handle_frame(frame, &mut dispatch),
                Decoded::Stray(text) => {
                    tracing::warn!("Non-protocol output from language server: {text:?}");
                    dispatch.events.push(ClientEvent::Log(text));
                }
            }
        }
        dispatch
    }

    fn handle_frame(&mut self, frame: Map<String, Value>, dispatch: &mut Dispatch) {
        let Some(incoming) = Incoming::parse(frame) else {
            tracing::trace!("Ignoring object that is neither request, response nor notification");
            return;
        };

        match incoming {
            Incoming::Response { id, result, error } => {
                if id.as_u64().is_some() && id.as_u64() == self.initialize_id {
                    self.initialize_id = None;
                    self.handle_initialize_response(result, error, dispatch);
                    return;
                }
                let Some(handler) = self.pending.take(&id) else {
                    tracing::trace!("Discarding response with no pending request: {id}");
                    return;
                };
                let outcome = match error {
                    Some(error) => Err(ResponseError::from_value(error)),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                dispatch.completions.push((handler, outcome));
            }
            Incoming::ServerRequest { id, method, params } => {
                let outcome = dispatch::answer(&method, params.as_ref(), self.root_uri());
                match &outcome {
                    Ok(_) => tracing::debug!("Answered server request {method}"),
                    Err(_) => tracing::debug!("Server request {method} not supported"),
                }
                dispatch.outbound.push(Response::new(id, outcome).into());
            }
            Incoming::Notification { method, params } => {
                if let Some(event) = router::route(&method, params) {
                    dispatch.events.push(event);
                }
            }
        }
    }

    fn handle_initialize_response(
        &mut self,
        result: Option<Value>,
        error: Option<Value>,
        dispatch: &mut Dispatch,
    ) {
        if self.state != SessionState::Starting {
            return;
        }

        if let Some(error) = error.filter(|e| !is_empty_object(e)) {
            let error = ResponseError::from_value(error);
            tracing::warn!("LSP initialize failed: {}", error.message);
            dispatch
                .events
                .push(ClientEvent::Log(format!("initialize failed: {}", error.message)));
            dispatch.abort = true;
            return;
        }

        self.server_capabilities = result.and_then(|mut r| r.get_mut("capabilities").map(Value::take));
        self.state = SessionState::Ready;
        dispatch
            .outbound
            .push(Notification::new("initialized", Some(Value::Object(Map::new()))).into());
        dispatch.events.push(ClientEvent::Ready(true));
        tracing::info!("Language server ready");
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn clear(&mut self) {
        self.root_uri = None;
        self.next_id = 1;
        self.initialize_id = None;
        self.pending.clear();
        self.documents.clear();
        self.decoder.clear();
        self.server_capabilities = None;
    }
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}
