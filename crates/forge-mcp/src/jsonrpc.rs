//! JSON-RPC 2.0 envelope codec shared by both transports.
//!
//! The process transport writes these frames one per line; the remote
//! transport sends a single frame as an HTTP body. The payload is identical.

use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The fixed `jsonrpc` field value.
pub const JSONRPC_VERSION: &str = "2.0";

/// The two MCP methods the proxy forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ListTools,
    CallTool,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListTools => "tools/list",
            Self::CallTool => "tools/call",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Serialize)]
struct JsonRpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
}

/// Encode a request as one newline-terminated frame.
pub fn encode_request(id: u64, method: &str, params: &Value) -> Result<String, FrameError> {
    let mut frame = serde_json::to_string(&JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION,
        id,
        method,
        params,
    })?;
    frame.push('\n');
    Ok(frame)
}

/// Encode a notification (no `id`, no response expected) as one frame.
pub fn encode_notification(method: &str) -> Result<String, FrameError> {
    let mut frame = serde_json::to_string(&JsonRpcNotification {
        jsonrpc: JSONRPC_VERSION,
        method,
    })?;
    frame.push('\n');
    Ok(frame)
}

/// Any inbound JSON-RPC object: response, notification, or server request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// The outcome carried by a response frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Result(Value),
    Error(Value),
}

impl Frame {
    /// A request or notification sent by the server rather than a response.
    pub fn is_server_initiated(&self) -> bool {
        self.method.is_some()
    }

    /// Interpret this frame as the response to request `expected_id`.
    ///
    /// An `error` field wins over `result` if a server sends both.
    pub fn into_reply(self, expected_id: u64) -> Result<Reply, FrameError> {
        if let Some(id) = &self.id {
            if id.as_u64() != Some(expected_id) {
                return Err(FrameError::IdMismatch {
                    expected: expected_id,
                    got: id.clone(),
                });
            }
        }
        match (self.error, self.result) {
            (Some(error), _) => Ok(Reply::Error(error)),
            (None, Some(result)) => Ok(Reply::Result(result)),
            (None, None) => Err(FrameError::MissingOutcome),
        }
    }
}

/// Parse one inbound frame. The bytes must hold a single JSON object.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    let value: Value = serde_json::from_slice(bytes)?;
    if !value.is_object() {
        return Err(FrameError::NotAnObject);
    }
    Ok(serde_json::from_value(value)?)
}

/// Collect the `data` payload of each event in a complete `text/event-stream` body.
///
/// Multi-line `data:` fields are joined with `\n`; comments and other fields
/// are ignored. Events without data are skipped.
pub fn extract_event_data(body: &str) -> Vec<String> {
    let normalized = body.replace("\r\n", "\n");
    let mut events = Vec::new();
    for raw_event in normalized.split("\n\n") {
        let mut data: Option<String> = None;
        for line in raw_event.lines() {
            let Some(value) = line.strip_prefix("data:") else {
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
        if let Some(data) = data.filter(|d| !d.trim().is_empty()) {
            events.push(data);
        }
    }
    events
}
