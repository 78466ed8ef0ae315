//! Routing of server notifications to caller events.

use serde_json::Value;

use crate::types::ClientEvent;

/// Map a server notification to the event the caller should see, if any.
/// Notifications are never answered.
pub(crate) fn route(method: &str, params: Option<Value>) -> Option<ClientEvent> {
    match method {
        "textDocument/publishDiagnostics" => {
            let mut params = params?;
            let uri = params.get("uri")?.as_str()?.to_string();
            let diagnostics = match params.get_mut("diagnostics").map(Value::take) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            Some(ClientEvent::Diagnostics { uri, diagnostics })
        }
        "window/logMessage" | "window/showMessage" => {
            let message = params?.get("message")?.as_str()?.to_string();
            Some(ClientEvent::Log(message))
        }
        _ => {
            tracing::trace!("Ignoring notification: {method}");
            None
        }
    }
}
