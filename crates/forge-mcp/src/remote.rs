//! Remote transport: one JSON-RPC envelope per HTTP POST.
//!
//! There is no `initialize` handshake here, unlike the process transport.
//! Remote servers are treated as already initialized and stateless per call.

use crate::error::{FrameError, ProxyError};
use crate::jsonrpc::{self, Method, Reply};
use forge_types::RemoteDescriptor;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Request id used for every remote call.
pub const REMOTE_REQUEST_ID: u64 = 1;

/// Longest slice of an HTTP error body quoted in errors.
const MAX_BODY_SNIPPET: usize = 200;

/// Sends single JSON-RPC requests to HTTP endpoints.
#[derive(Debug, Clone)]
pub struct RemoteTransport {
    http: reqwest::Client,
    timeout: Duration,
}

impl RemoteTransport {
    /// Build the HTTP client. `timeout` covers connect through the full body.
    ///
    /// Idle connections are not kept, so no socket is reused across calls.
    pub fn new(timeout: Duration) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| ProxyError::TransportUnavailable {
                reason: error_chain(&e),
            })?;
        Ok(Self { http, timeout })
    }

    /// POST one request and return its `result`.
    pub async fn call(
        &self,
        descriptor: &RemoteDescriptor,
        method: Method,
        params: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ProxyError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ProxyError::Cancelled),
            result = self.post(descriptor, method, params) => result,
        }
    }

    async fn post(
        &self,
        descriptor: &RemoteDescriptor,
        method: Method,
        params: &Value,
    ) -> Result<Value, ProxyError> {
        let url = descriptor.url.trim_end_matches('/');
        let body = jsonrpc::encode_request(REMOTE_REQUEST_ID, method.as_str(), params)?;

        let mut request = self
            .http
            .post(url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(body);
        if let Some(token) = descriptor.auth_token() {
            request = request.bearer_auth(token);
        }

        tracing::debug!(url, %method, "POST");
        let response = request
            .send()
            .await
            .map_err(|e| self.classify(&e, url, method))?;

        let status = response.status();
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify(&e, url, method))?;

        match decode_body(&bytes, is_event_stream) {
            Ok(Reply::Error(payload)) => Err(ProxyError::RemoteError { payload }),
            _ if !status.is_success() => Err(ProxyError::ConnectFailed {
                url: url.to_string(),
                reason: format!("HTTP {status}: {}", snippet(&bytes)),
            }),
            Ok(Reply::Result(result)) => Ok(result),
            Err(e) => Err(e.into()),
        }
    }

    fn classify(&self, e: &reqwest::Error, url: &str, method: Method) -> ProxyError {
        if e.is_timeout() {
            ProxyError::CallTimeout {
                method: method.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            ProxyError::ConnectFailed {
                url: url.to_string(),
                reason: error_chain(e),
            }
        }
    }
}

/// Decode a response body, plain JSON or a complete event stream.
fn decode_body(bytes: &[u8], is_event_stream: bool) -> Result<Reply, FrameError> {
    if !is_event_stream {
        return jsonrpc::decode_frame(bytes)?.into_reply(REMOTE_REQUEST_ID);
    }

    let text = String::from_utf8_lossy(bytes);
    for data in jsonrpc::extract_event_data(&text) {
        let frame = jsonrpc::decode_frame(data.as_bytes())?;
        if frame.is_server_initiated() {
            continue;
        }
        return frame.into_reply(REMOTE_REQUEST_ID);
    }
    Err(FrameError::EmptyEventStream)
}

fn snippet(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    match text.char_indices().nth(MAX_BODY_SNIPPET) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Render an error with its sources; reqwest's top-level message is terse.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
