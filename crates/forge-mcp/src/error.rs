//! Error types for proxied MCP calls.

use forge_types::{DescriptorError, RegistryError};
use thiserror::Error;

/// Every way a proxied call can fail.
///
/// Each failure is terminal for its own call only. Nothing here retries.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Server '{alias}' not found in registry")]
    UnknownAlias { alias: String },

    #[error("Invalid descriptor for '{alias}': {source}")]
    InvalidDescriptor {
        alias: String,
        #[source]
        source: DescriptorError,
    },

    #[error("Registry unavailable: {0}")]
    Registry(#[source] RegistryError),

    #[error("Failed to spawn MCP server '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Handshake with '{command}' failed: {reason}")]
    HandshakeFailed { command: String, reason: String },

    #[error("'{method}' timed out after {timeout_ms}ms")]
    CallTimeout { method: String, timeout_ms: u64 },

    /// The downstream error object, exactly as received.
    #[error("Server error: {payload}")]
    RemoteError { payload: serde_json::Value },

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),

    #[error("HTTP transport unavailable: {reason}")]
    TransportUnavailable { reason: String },

    #[error("Failed to reach '{url}': {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("Unrecognized result shape: {payload}")]
    UnrecognizedResultShape { payload: serde_json::Value },

    #[error("Call cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why an inbound (or outbound) frame could not be used.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("response has neither result nor error")]
    MissingOutcome,

    #[error("response id {got} does not match request id {expected}")]
    IdMismatch {
        expected: u64,
        got: serde_json::Value,
    },

    #[error("server closed its output before responding")]
    UnexpectedEof,

    #[error("event stream carried no data")]
    EmptyEventStream,
}

impl From<serde_json::Error> for ProxyError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedFrame(FrameError::Json(e))
    }
}

impl From<RegistryError> for ProxyError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound { alias } => Self::UnknownAlias { alias },
            RegistryError::InvalidDescriptor { alias, source } => {
                Self::InvalidDescriptor { alias, source }
            }
            other => Self::Registry(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_not_found_maps_to_unknown_alias() {
        let err: ProxyError = RegistryError::NotFound {
            alias: "stripe".into(),
        }
        .into();
        match err {
            ProxyError::UnknownAlias { alias } => assert_eq!(alias, "stripe"),
            other => panic!("Expected UnknownAlias, got {other:?}"),
        }
    }

    #[test]
    fn registry_io_maps_to_registry() {
        let err: ProxyError = RegistryError::Io(std::io::Error::other("disk gone")).into();
        assert!(matches!(err, ProxyError::Registry(RegistryError::Io(_))));
    }

    #[test]
    fn remote_error_displays_payload() {
        let err = ProxyError::RemoteError {
            payload: serde_json::json!({"code": -32601, "message": "Method not found"}),
        };
        let text = err.to_string();
        assert!(text.contains("-32601"));
        assert!(text.contains("Method not found"));
    }
}
