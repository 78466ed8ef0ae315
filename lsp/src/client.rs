//! `LspClient` facade — the public API of the crate.
//!
//! One client drives at most one language server at a time. All session
//! state sits behind a single mutex; the process I/O tasks feed it through
//! a [`ProcessSink`] bound to the session generation that spawned them, so
//! output from an old process can never touch a newer session.
//!
//! Start and stop are serialized by a separate async lifecycle lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::config::ClientConfig;
use crate::process::{ProcessSink, ServerProcess};
use crate::protocol::{Outbound, ResponseError};
use crate::registry::ResponseHandler;
use crate::session::{Dispatch, ProtocolSession};
use crate::types::{ClientEvent, RequestError, ServerStopReason, SessionState, StartError};

struct Shared {
    session: ProtocolSession,
    process: Option<ServerProcess>,
}

impl Shared {
    /// Queue a message on the live process, if there is one.
    fn send(&self, msg: Outbound) {
        let sent = self.process.as_ref().is_some_and(|p| p.send(msg));
        if !sent {
            tracing::trace!("Dropping outbound message: no writer");
        }
    }
}

struct Inner {
    config: ClientConfig,
    shared: Mutex<Shared>,
    lifecycle: tokio::sync::Mutex<()>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ClientEvent) {
        // The caller dropping its receiver is not an error for the client.
        let _ = self.event_tx.send(event);
    }

    /// Run the handlers of a dispatch and react to an aborted handshake.
    /// Must be called without the session lock held.
    fn complete(self: &Arc<Self>, dispatch: Dispatch, generation: u64) {
        for (handler, outcome) in dispatch.completions {
            handler(outcome);
        }
        if dispatch.abort {
            self.spawn_teardown(generation);
        }
    }

    /// Stop the session started as `generation` from a background task.
    /// I/O tasks use this so that they never await their own abort.
    fn spawn_teardown(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.teardown(Some(generation)).await;
        });
    }

    async fn teardown(&self, only: Option<u64>) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown_locked(only).await
    }

    /// Stop the server and reset the session. The caller holds the
    /// lifecycle lock.
    ///
    /// With `only` set, nothing happens unless that generation is still the
    /// current session. Returns `true` when a live process was torn down.
    async fn teardown_locked(&self, only: Option<u64>) -> bool {
        let (process, was_ready, generation) = {
            let mut shared = self.lock();
            let generation = shared.session.generation();
            if only.is_some_and(|g| g != generation) {
                return false;
            }
            let was_ready = shared.session.is_ready();
            let Some(process) = shared.process.take() else {
                if shared.session.state().is_live() {
                    shared.session.finish();
                }
                return false;
            };
            // Leaves Starting too, so an `initialize` response still in the
            // pipe cannot make the session ready while we terminate.
            for msg in shared.session.begin_shutdown() {
                process.send(msg);
            }
            (process, was_ready, generation)
        };

        tracing::info!(pid = ?process.id(), "Stopping language server");
        let graceful = was_ready.then(|| self.config.graceful_exit());
        process.terminate(graceful, self.config.kill_grace()).await;

        {
            let mut shared = self.lock();
            if shared.session.generation() == generation {
                shared.session.finish();
            }
        }
        if was_ready {
            self.emit(ClientEvent::Ready(false));
        }
        true
    }
}

/// Feeds process output into the session it was spawned for.
struct SessionSink {
    inner: Weak<Inner>,
    generation: u64,
}

impl ProcessSink for SessionSink {
    fn stdout(&self, chunk: &[u8]) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let dispatch = {
            let mut shared = inner.lock();
            if !shared.session.accepts(self.generation) {
                return;
            }
            let mut dispatch = shared.session.receive(chunk);
            for msg in std::mem::take(&mut dispatch.outbound) {
                shared.send(msg);
            }
            for event in std::mem::take(&mut dispatch.events) {
                inner.emit(event);
            }
            dispatch
        };
        inner.complete(dispatch, self.generation);
    }

    fn stderr_line(&self, line: String) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.lock().session.accepts(self.generation) {
            inner.emit(ClientEvent::Log(line));
        }
    }

    fn closed(&self, reason: ServerStopReason) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if !inner.lock().session.accepts(self.generation) {
            return;
        }
        let message = match reason {
            ServerStopReason::Exited => "language server exited".to_string(),
            ServerStopReason::Failed(e) => format!("language server I/O failed: {e}"),
        };
        tracing::warn!("{message}");
        inner.emit(ClientEvent::Log(message));
        inner.spawn_teardown(self.generation);
    }
}

/// Handle to a language server connection.
///
/// Cheap to clone; all clones drive the same session. Dropping the last
/// clone kills a still-running server.
#[derive(Clone)]
pub struct LspClient {
    inner: Arc<Inner>,
}

impl LspClient {
    /// Create an idle client and the receiver for its events.
    pub fn new(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            shared: Mutex::new(Shared {
                session: ProtocolSession::default(),
                process: None,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
            event_tx,
        });
        (Self { inner }, event_rx)
    }

    /// Spawn the server and send `initialize`.
    ///
    /// Returns once the request is queued; readiness is reported later via
    /// [`ClientEvent::Ready`]. A previous session is stopped first.
    pub async fn start(
        &self,
        command: &str,
        args: &[String],
        root_uri: &str,
    ) -> Result<(), StartError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.teardown_locked(None).await;

        let generation = self.inner.lock().session.begin(root_uri);
        let sink = Arc::new(SessionSink {
            inner: Arc::downgrade(&self.inner),
            generation,
        });

        let process = match ServerProcess::spawn(command, args, sink) {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!("Failed to start language server: {e:#}");
                self.inner
                    .emit(ClientEvent::Log(format!("failed to start {command}: {e}")));
                self.inner.lock().session.finish();
                return Err(e);
            }
        };

        let mut shared = self.inner.lock();
        let initialize = shared.session.initialize();
        process.send(initialize);
        shared.process = Some(process);
        Ok(())
    }

    /// Stop the server: graceful `shutdown`/`exit` when ready, then kill.
    ///
    /// Safe to call repeatedly or concurrently. Returns `true` only for the
    /// call that tore a live server down. Pending request handlers are
    /// dropped without being invoked.
    pub async fn stop(&self) -> bool {
        self.inner.teardown(None).await
    }

    /// Send a request. Returns the request id, or `None` when the session is
    /// not ready, in which case `handler` has already been called with a
    /// `-32002` error before this returns.
    pub fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        handler: Option<ResponseHandler>,
    ) -> Option<u64> {
        let mut shared = self.inner.lock();
        if !shared.session.is_ready() {
            drop(shared);
            if let Some(handler) = handler {
                handler(Err(ResponseError::process_not_running()));
            }
            return None;
        }
        let (id, msg) = shared.session.request(method, params, handler);
        shared.send(msg);
        Some(id)
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.send_request(
            method,
            params,
            Some(Box::new(move |outcome| {
                let _ = tx.send(outcome);
            })),
        );
        match rx.await {
            Ok(outcome) => outcome.map_err(RequestError::from),
            Err(_) => Err(RequestError::Dropped),
        }
    }

    /// Announce a newly opened document. Ignored unless ready.
    pub fn did_open(&self, uri: &str, language_id: &str, text: &str) {
        let mut shared = self.inner.lock();
        if let Some(msg) = shared.session.did_open(uri, language_id, text) {
            shared.send(msg);
        }
    }

    /// Replace a document's full text. Ignored unless ready.
    pub fn did_change(&self, uri: &str, text: &str) {
        let mut shared = self.inner.lock();
        if let Some(msg) = shared.session.did_change(uri, text) {
            shared.send(msg);
        }
    }

    pub fn did_close(&self, uri: &str) {
        let mut shared = self.inner.lock();
        if let Some(msg) = shared.session.did_close(uri) {
            shared.send(msg);
        }
    }

    pub fn did_save(&self, uri: &str, text: &str) {
        let shared = self.inner.lock();
        if let Some(msg) = shared.session.did_save(uri, text) {
            shared.send(msg);
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().session.state()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.lock().session.is_ready()
    }

    /// Version last sent for `uri`, if the document is open.
    #[must_use]
    pub fn document_version(&self, uri: &str) -> Option<i32> {
        self.inner.lock().session.document_version(uri)
    }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.lock().session.pending_len()
    }

    /// Capabilities the server returned from `initialize`.
    #[must_use]
    pub fn server_capabilities(&self) -> Option<Value> {
        self.inner.lock().session.server_capabilities().cloned()
    }

    #[must_use]
    pub fn root_uri(&self) -> Option<String> {
        self.inner.lock().session.root_uri().map(String::from)
    }
}
