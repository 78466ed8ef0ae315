//! JSON-RPC envelopes and LSP message shapes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error code for requests issued while no server session is running.
pub const PROCESS_NOT_RUNNING: i64 = -32002;

/// Standard JSON-RPC code for an unsupported method.
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

/// A JSON-RPC error object, as carried by a response's `error` member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ResponseError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn process_not_running() -> Self {
        Self::new(PROCESS_NOT_RUNNING, "process not running")
    }

    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found")
    }

    /// Read an `error` member leniently: servers sometimes omit `code` or
    /// send a bare string.
    pub(crate) fn from_value(value: Value) -> Self {
        match value {
            Value::String(message) => Self::new(0, message),
            other => serde_json::from_value(other).unwrap_or_else(|_| Self::new(0, "")),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// Reply to a request the server sent us.
#[derive(Debug, Serialize)]
pub(crate) struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn new(id: Value, outcome: Result<Value, ResponseError>) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: "2.0",
            id,
            result,
            error,
        }
    }
}

/// Any message the client writes to the server.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum Outbound {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl From<Request> for Outbound {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Notification> for Outbound {
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}

impl From<Response> for Outbound {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

/// An inbound JSON-RPC object, classified by which members it carries.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Incoming {
    Response {
        id: Value,
        result: Option<Value>,
        error: Option<Value>,
    },
    ServerRequest {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

impl Incoming {
    /// Classify an object. Objects with neither `id` nor `method` are not
    /// JSON-RPC traffic and yield `None`.
    pub fn parse(mut frame: Map<String, Value>) -> Option<Self> {
        let id = frame.remove("id");
        let method = match frame.remove("method") {
            Some(Value::String(method)) => Some(method),
            _ => None,
        };
        let params = frame.remove("params");

        match (id, method) {
            (Some(id), None) => Some(Self::Response {
                id,
                result: frame.remove("result"),
                error: frame.remove("error").filter(|e| !e.is_null()),
            }),
            (Some(id), Some(method)) => Some(Self::ServerRequest { id, method, params }),
            (None, Some(method)) => Some(Self::Notification { method, params }),
            (None, None) => None,
        }
    }
}

pub(crate) fn initialize_params(root_uri: Option<&str>) -> Value {
    serde_json::json!({
        "processId": null,
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "synchronization": {
                    "didSave": true,
                    "willSave": false,
                    "willSaveWaitUntil": false
                }
            }
        }
    })
}

pub(crate) fn did_open_params(uri: &str, language_id: &str, version: i32, text: &str) -> Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

pub(crate) fn did_change_params(uri: &str, version: i32, text: &str) -> Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "version": version
        },
        "contentChanges": [{
            "text": text
        }]
    })
}

pub(crate) fn did_close_params(uri: &str) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri }
    })
}

pub(crate) fn did_save_params(uri: &str, text: &str) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri },
        "text": text
    })
}

/// Display name for a workspace folder: the last non-empty path segment of
/// the URI, or the URI itself when it has no path.
pub(crate) fn workspace_folder_name(root_uri: &str) -> String {
    url::Url::parse(root_uri)
        .ok()
        .and_then(|u| {
            u.path_segments()?
                .filter(|segment| !segment.is_empty())
                .next_back()
                .map(String::from)
        })
        .unwrap_or_else(|| root_uri.to_string())
}

pub fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

pub fn directory_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_directory_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
}
