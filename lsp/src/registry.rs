//! Outgoing request id → completion handler table.

use std::collections::HashMap;

use serde_json::Value;

use crate::protocol::ResponseError;

/// Completion handler for a request sent to the server.
///
/// Invoked at most once: with the `result` member on success, or with the
/// `error` member when the server rejects the request.
pub type ResponseHandler = Box<dyn FnOnce(Result<Value, ResponseError>) + Send + 'static>;

#[derive(Default)]
pub(crate) struct PendingRequests {
    handlers: HashMap<u64, ResponseHandler>,
}

impl PendingRequests {
    pub fn insert(&mut self, id: u64, handler: ResponseHandler) {
        self.handlers.insert(id, handler);
    }

    /// Remove the handler for a response id. Ids that are not unsigned
    /// integers can never match a request we sent.
    pub fn take(&mut self, id: &Value) -> Option<ResponseHandler> {
        let id = id.as_u64()?;
        self.handlers.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Drop every handler without invoking it.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().collect();
        ids.sort();
        f.debug_struct("PendingRequests").field("ids", &ids).finish()
    }
}
