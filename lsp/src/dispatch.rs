//! Answers for requests the server sends to the client.
//!
//! The client implements none of these capabilities; it acknowledges them so
//! that servers waiting on a reply do not stall.

use serde_json::Value;

use crate::protocol::{self, ResponseError};

/// Compute the reply to a server→client request.
pub(crate) fn answer(
    method: &str,
    params: Option<&Value>,
    root_uri: Option<&str>,
) -> Result<Value, ResponseError> {
    match method {
        "window/workDoneProgress/create"
        | "client/registerCapability"
        | "client/unregisterCapability"
        | "window/showMessageRequest" => Ok(Value::Null),
        "workspace/configuration" => Ok(configuration(params)),
        "workspace/workspaceFolders" => Ok(workspace_folders(root_uri)),
        _ => Err(ResponseError::method_not_found()),
    }
}

/// One empty settings object per requested item.
fn configuration(params: Option<&Value>) -> Value {
    let count = params
        .and_then(|p| p.get("items"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    Value::Array(vec![Value::Object(serde_json::Map::new()); count])
}

fn workspace_folders(root_uri: Option<&str>) -> Value {
    match root_uri.filter(|uri| !uri.is_empty()) {
        Some(uri) => serde_json::json!([{
            "uri": uri,
            "name": protocol::workspace_folder_name(uri)
        }]),
        None => serde_json::json!([]),
    }
}
