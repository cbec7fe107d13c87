//! Process transport: one spawned server per call.
//!
//! Every call pays for spawn + handshake. Live children are never cached
//! across calls, so a call can never observe a stale process.

use crate::child::{ChildHandle, PipeError, SessionState};
use crate::config::ProxyTimeouts;
use crate::error::{FrameError, ProxyError};
use crate::jsonrpc::{self, Method, Reply};
use forge_types::ProcessDescriptor;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// MCP protocol version we announce.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name sent in `clientInfo`.
pub const CLIENT_NAME: &str = "mcp-forge";

const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// Runs single request/response exchanges against freshly spawned servers.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    base_env: HashMap<String, String>,
    timeouts: ProxyTimeouts,
}

impl ProcessTransport {
    /// `base_env` is the already-resolved ambient environment for children.
    pub fn new(base_env: HashMap<String, String>, timeouts: ProxyTimeouts) -> Self {
        Self { base_env, timeouts }
    }

    /// Spawn, handshake, send one request, read its response, clean up.
    ///
    /// The child is terminated before this returns, whatever the outcome.
    pub async fn call(
        &self,
        descriptor: &ProcessDescriptor,
        method: Method,
        params: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ProxyError> {
        let mut child = ChildHandle::spawn(descriptor, &self.base_env)?;

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ProxyError::Cancelled),
            result = exchange(&mut child, method, params, &self.timeouts) => result,
        };

        if let Err(e) = &outcome {
            tracing::debug!(
                command = %descriptor.command,
                state = ?child.state(),
                "{method} failed: {e}"
            );
        }
        child.shutdown(self.timeouts.grace()).await;
        outcome
    }
}

async fn exchange(
    child: &mut ChildHandle,
    method: Method,
    params: &Value,
    timeouts: &ProxyTimeouts,
) -> Result<Value, ProxyError> {
    handshake(child, timeouts.handshake()).await?;
    request(child, method, params, timeouts.response()).await
}

fn initialize_params() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// `initialize` request/response, then the `initialized` notification.
async fn handshake(child: &mut ChildHandle, limit: Duration) -> Result<(), ProxyError> {
    child.set_state(SessionState::Initializing);
    let deadline = Instant::now() + limit;
    let command = child.command().to_string();
    let failed = |reason: String| ProxyError::HandshakeFailed {
        command: command.clone(),
        reason,
    };

    let id = child.next_id();
    let frame = jsonrpc::encode_request(id, "initialize", &initialize_params())?;
    child.send_by(&frame, deadline).await.map_err(|e| {
        failed(match e {
            PipeError::TimedOut => format!("initialize not accepted within {}ms", millis(limit)),
            other => format!("failed to write initialize: {other}"),
        })
    })?;

    let reply = child.read_reply(id, deadline).await.map_err(|e| {
        failed(match e {
            PipeError::TimedOut => format!("no initialize response within {}ms", millis(limit)),
            PipeError::Eof => "server exited during initialize".to_string(),
            PipeError::Frame(f) => format!("malformed initialize response: {f}"),
            PipeError::Io(e) => format!("failed to read initialize response: {e}"),
        })
    })?;
    if let Reply::Error(payload) = reply {
        return Err(failed(format!("initialize rejected: {payload}")));
    }

    let notification = jsonrpc::encode_notification(INITIALIZED_NOTIFICATION)?;
    child.send_by(&notification, deadline).await.map_err(|e| {
        failed(match e {
            PipeError::TimedOut => format!(
                "initialized notification not accepted within {}ms",
                millis(limit)
            ),
            other => format!("failed to write initialized notification: {other}"),
        })
    })?;

    child.set_state(SessionState::Ready);
    Ok(())
}

/// The caller's request. Writing it and reading the reply share one deadline.
async fn request(
    child: &mut ChildHandle,
    method: Method,
    params: &Value,
    limit: Duration,
) -> Result<Value, ProxyError> {
    let deadline = Instant::now() + limit;
    let failed = |e: PipeError| match e {
        PipeError::TimedOut => ProxyError::CallTimeout {
            method: method.to_string(),
            timeout_ms: millis(limit),
        },
        PipeError::Eof => FrameError::UnexpectedEof.into(),
        PipeError::Frame(f) => f.into(),
        PipeError::Io(e) => e.into(),
    };

    let id = child.next_id();
    let frame = jsonrpc::encode_request(id, method.as_str(), params)?;
    child.send_by(&frame, deadline).await.map_err(failed)?;
    child.set_state(SessionState::AwaitingResponse);

    let reply = child.read_reply(id, deadline).await.map_err(failed)?;
    child.set_state(SessionState::Completed);

    match reply {
        Reply::Result(result) => Ok(result),
        Reply::Error(payload) => Err(ProxyError::RemoteError { payload }),
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT_OK: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"mock","version":"0.0.1"}}}"#;

    fn transport() -> ProcessTransport {
        ProcessTransport::new(
            std::env::vars().collect(),
            ProxyTimeouts {
                handshake_ms: 2000,
                response_ms: 2000,
                remote_ms: 2000,
                grace_ms: 500,
            },
        )
    }

    /// A mock server: answer initialize, swallow the notification, then run `then`.
    fn mock(then: &str) -> ProcessDescriptor {
        let script = format!("read -r line; echo '{INIT_OK}'; read -r line; read -r line; {then}");
        ProcessDescriptor::new("sh").with_args(["-c".to_string(), script])
    }

    #[tokio::test]
    async fn successful_call_returns_result() {
        let server = mock(r#"echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}'"#);
        let result = transport()
            .call(&server, Method::ListTools, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"tools": []}));
    }

    #[tokio::test]
    async fn handshake_and_request_frames_are_well_formed() {
        // Echo what the server received back as tool output.
        let script = format!(
            r#"read -r init; echo '{INIT_OK}'; read -r note; read -r req; printf '{{"jsonrpc":"2.0","id":2,"result":{{"init":%s,"note":%s,"req":%s}}}}\n' "$init" "$note" "$req""#
        );
        let server = ProcessDescriptor::new("sh").with_args(["-c".to_string(), script]);
        let params = serde_json::json!({"name": "echo", "arguments": {"x": 1}});
        let result = transport()
            .call(&server, Method::CallTool, &params, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result["init"]["method"], "initialize");
        assert_eq!(result["init"]["id"], 1);
        assert_eq!(result["init"]["params"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["init"]["params"]["clientInfo"]["name"], CLIENT_NAME);
        assert!(result["init"]["params"]["capabilities"].is_object());
        assert_eq!(result["note"]["method"], "notifications/initialized");
        assert!(result["note"].get("id").is_none());
        assert_eq!(result["req"]["method"], "tools/call");
        assert_eq!(result["req"]["id"], 2);
        assert_eq!(result["req"]["params"], params);
    }

    #[tokio::test]
    async fn descriptor_env_overrides_base_env() {
        let mut base: HashMap<String, String> = std::env::vars().collect();
        base.insert("GREETING".into(), "from-base".into());
        base.insert("FAREWELL".into(), "bye".into());
        let transport = ProcessTransport::new(base, ProxyTimeouts::default());

        let server = mock(
            r#"printf '{"jsonrpc":"2.0","id":2,"result":{"greeting":"%s","farewell":"%s"}}\n' "$GREETING" "$FAREWELL""#,
        )
        .with_env("GREETING", "from-descriptor");
        let result = transport
            .call(&server, Method::ListTools, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["greeting"], "from-descriptor");
        assert_eq!(result["farewell"], "bye");
    }

    #[tokio::test]
    async fn ambient_environment_does_not_leak() {
        // Only PATH is passed through; HOME must not reach the child.
        let base: HashMap<String, String> =
            std::env::vars().filter(|(k, _)| k == "PATH").collect();
        let transport = ProcessTransport::new(base, ProxyTimeouts::default());
        let server = mock(
            r#"printf '{"jsonrpc":"2.0","id":2,"result":{"home":"%s"}}\n' "${HOME:-unset}""#,
        );
        let result = transport
            .call(&server, Method::ListTools, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["home"], "unset");
    }

    #[tokio::test]
    async fn error_reply_is_passed_through() {
        let server = mock(
            r#"echo '{"jsonrpc":"2.0","id":2,"error":{"code":-32602,"message":"Unknown tool: nope"}}'"#,
        );
        let err = transport()
            .call(
                &server,
                Method::CallTool,
                &serde_json::json!({"name": "nope"}),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            ProxyError::RemoteError { payload } => {
                assert_eq!(
                    payload,
                    serde_json::json!({"code": -32602, "message": "Unknown tool: nope"})
                );
            }
            other => panic!("Expected RemoteError, got {other}"),
        }
    }

    #[tokio::test]
    async fn silent_server_fails_handshake() {
        let server = ProcessDescriptor::new("sleep").with_args(["10"]);
        let transport = ProcessTransport::new(
            std::env::vars().collect(),
            ProxyTimeouts {
                handshake_ms: 100,
                ..ProxyTimeouts::default()
            },
        );
        let err = transport
            .call(&server, Method::ListTools, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ProxyError::HandshakeFailed { command, reason } => {
                assert_eq!(command, "sleep");
                assert!(reason.contains("100ms"), "reason: {reason}");
            }
            other => panic!("Expected HandshakeFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn echo_server_never_completes_handshake() {
        // `cat` echoes our own request back; it is server-initiated noise, not a response.
        let server = ProcessDescriptor::new("cat");
        let transport = ProcessTransport::new(
            std::env::vars().collect(),
            ProxyTimeouts {
                handshake_ms: 200,
                ..ProxyTimeouts::default()
            },
        );
        let err = transport
            .call(&server, Method::ListTools, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::HandshakeFailed { .. }));
    }

    #[tokio::test]
    async fn garbage_during_handshake_fails_handshake() {
        let server = ProcessDescriptor::new("sh").with_args([
            "-c",
            "read -r line; echo 'Starting server...'; exec sleep 10",
        ]);
        let err = transport()
            .call(&server, Method::ListTools, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ProxyError::HandshakeFailed { reason, .. } => {
                assert!(reason.contains("malformed"), "reason: {reason}");
            }
            other => panic!("Expected HandshakeFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn initialize_error_fails_handshake() {
        let server = ProcessDescriptor::new("sh").with_args([
            "-c",
            r#"read -r line; echo '{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"unsupported version"}}'"#,
        ]);
        let err = transport()
            .call(&server, Method::ListTools, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ProxyError::HandshakeFailed { reason, .. } => {
                assert!(reason.contains("unsupported version"), "reason: {reason}");
            }
            other => panic!("Expected HandshakeFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let server = mock("exec sleep 10");
        let transport = ProcessTransport::new(
            std::env::vars().collect(),
            ProxyTimeouts {
                response_ms: 150,
                grace_ms: 500,
                ..ProxyTimeouts::default()
            },
        );
        let err = transport
            .call(&server, Method::CallTool, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ProxyError::CallTimeout { method, timeout_ms } => {
                assert_eq!(method, "tools/call");
                assert_eq!(timeout_ms, 150);
            }
            other => panic!("Expected CallTimeout, got {other}"),
        }
    }

    #[tokio::test]
    async fn exit_before_response_is_malformed() {
        let server = mock("exit 0");
        let err = transport()
            .call(&server, Method::ListTools, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MalformedFrame(FrameError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn wrong_response_id_is_malformed() {
        let server = mock(r#"echo '{"jsonrpc":"2.0","id":99,"result":{}}'"#);
        let err = transport()
            .call(&server, Method::ListTools, &serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MalformedFrame(FrameError::IdMismatch { expected: 2, .. })
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let server = mock("exec sleep 10");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = transport()
            .call(&server, Method::CallTool, &serde_json::json!({}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn missing_executable_is_spawn_failure() {
        let err = transport()
            .call(
                &ProcessDescriptor::new("this_command_does_not_exist_xyz123"),
                Method::ListTools,
                &serde_json::json!({}),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::SpawnFailed { .. }));
    }
}
