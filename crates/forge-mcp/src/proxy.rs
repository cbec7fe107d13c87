//! Proxy facade: alias in, formatted text out.
//!
//! Resolves the alias, checks the descriptor, dispatches to the process or
//! remote transport, and formats the result. Calls share no mutable state, so
//! one `Proxy` can serve any number of concurrent calls.

use crate::config::ProxyTimeouts;
use crate::error::ProxyError;
use crate::format;
use crate::jsonrpc::Method;
use crate::process::ProcessTransport;
use crate::remote::RemoteTransport;
use forge_types::{RegistryStore, ServerDescriptor};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Single entry point for calls to registered MCP servers.
pub struct Proxy {
    registry: Arc<dyn RegistryStore>,
    process: ProcessTransport,
    /// The HTTP client, or why it could not be built. Only remote calls fail
    /// when it is missing.
    remote: Result<RemoteTransport, String>,
}

impl Proxy {
    /// `base_env` is the resolved ambient environment handed to every child.
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        base_env: HashMap<String, String>,
        timeouts: ProxyTimeouts,
    ) -> Self {
        let remote = RemoteTransport::new(timeouts.remote()).map_err(|e| {
            tracing::warn!("Remote MCP servers will be unavailable: {e}");
            e.to_string()
        });
        Self {
            registry,
            process: ProcessTransport::new(base_env, timeouts),
            remote,
        }
    }

    /// List the tools a server exposes.
    pub async fn discover(&self, alias: &str) -> Result<String, ProxyError> {
        self.invoke(alias, Method::ListTools, serde_json::json!({}))
            .await
    }

    /// Call one tool with JSON arguments.
    pub async fn call_tool(
        &self,
        alias: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<String, ProxyError> {
        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments,
        });
        self.invoke(alias, Method::CallTool, params).await
    }

    /// Resolve `alias`, perform one exchange, and format the result.
    pub async fn invoke(
        &self,
        alias: &str,
        method: Method,
        params: Value,
    ) -> Result<String, ProxyError> {
        self.invoke_with_cancel(alias, method, params, &CancellationToken::new())
            .await
    }

    /// Like [`Proxy::invoke`], but stops waiting when `cancel` fires.
    ///
    /// A cancelled process call still terminates its child before returning
    /// [`ProxyError::Cancelled`].
    pub async fn invoke_with_cancel(
        &self,
        alias: &str,
        method: Method,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<String, ProxyError> {
        self.invoke_reporting(alias, method, params, cancel)
            .await
            .result
    }

    /// Like [`Proxy::invoke_with_cancel`], and also reports which transport
    /// served the call, taken from the same registry lookup.
    pub async fn invoke_reporting(
        &self,
        alias: &str,
        method: Method,
        params: Value,
        cancel: &CancellationToken,
    ) -> CallReport {
        let descriptor = match self.resolve(alias).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                return CallReport {
                    transport: None,
                    result: Err(e),
                };
            }
        };

        let started = Instant::now();
        let result = match &descriptor {
            ServerDescriptor::Process(d) => self.process.call(d, method, &params, cancel).await,
            ServerDescriptor::Remote(d) => match &self.remote {
                Ok(transport) => transport.call(d, method, &params, cancel).await,
                Err(reason) => Err(ProxyError::TransportUnavailable {
                    reason: reason.clone(),
                }),
            },
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let transport = descriptor.transport_name();

        match &result {
            Ok(_) => tracing::info!(alias, transport, %method, elapsed_ms, "MCP call completed"),
            Err(e) => tracing::warn!(alias, transport, %method, elapsed_ms, "MCP call failed: {e}"),
        }

        CallReport {
            transport: Some(transport),
            result: result.and_then(|value| format::format_result(method, &value)),
        }
    }

    /// Look up `alias` and check its descriptor before any transport is touched.
    async fn resolve(&self, alias: &str) -> Result<ServerDescriptor, ProxyError> {
        let descriptor = self.registry.get(alias).await?.descriptor;
        descriptor
            .validate()
            .map_err(|source| ProxyError::InvalidDescriptor {
                alias: alias.to_string(),
                source,
            })?;
        Ok(descriptor)
    }
}

/// Outcome of one call and the transport that served it.
#[derive(Debug)]
pub struct CallReport {
    /// `"process"` or `"remote"`; `None` when the alias did not resolve to a
    /// valid descriptor.
    pub transport: Option<&'static str>,
    pub result: Result<String, ProxyError>,
}
