//! Server descriptors: how to reach one downstream MCP server.
//!
//! The registry stores one [`ServerEntry`] per alias. Its transport data is a
//! tagged [`ServerDescriptor`], so the process and remote paths are distinct
//! types and each carries only the fields it needs.

use crate::error::DescriptorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment key holding the bearer token for remote servers.
pub const AUTH_TOKEN_ENV: &str = "AUTH_TOKEN";

/// Transport-specific connection data for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ServerDescriptor {
    /// A local child process speaking newline-delimited JSON-RPC on stdio.
    #[serde(alias = "stdio")]
    Process(ProcessDescriptor),
    /// An HTTP endpoint accepting one JSON-RPC envelope per POST.
    #[serde(alias = "sse", alias = "http")]
    Remote(RemoteDescriptor),
}

/// Launch data for a process-backed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    /// Executable path or name, resolved against `PATH`.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra variables layered over the resolved ambient environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Endpoint data for a remote server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub url: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// A registry record: transport data plus metadata the proxy forwards untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(flatten)]
    pub descriptor: ServerDescriptor,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Whether mcp-forge created this server's source tree.
    #[serde(default)]
    pub managed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl ServerDescriptor {
    /// Short transport name used in listings and logs.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Process(_) => "process",
            Self::Remote(_) => "remote",
        }
    }

    /// The descriptor's environment map.
    pub fn env(&self) -> &HashMap<String, String> {
        match self {
            Self::Process(p) => &p.env,
            Self::Remote(r) => &r.env,
        }
    }

    /// Check the descriptor invariants before any spawn or network call.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        match self {
            Self::Process(p) => {
                if p.command.trim().is_empty() {
                    return Err(DescriptorError::EmptyCommand);
                }
                Ok(())
            }
            Self::Remote(r) => {
                if r.url.trim().is_empty() {
                    return Err(DescriptorError::EmptyUrl);
                }
                let parsed = url::Url::parse(&r.url).map_err(|e| DescriptorError::InvalidUrl {
                    url: r.url.clone(),
                    reason: e.to_string(),
                })?;
                match parsed.scheme() {
                    "http" | "https" => Ok(()),
                    other => Err(DescriptorError::UnsupportedScheme {
                        url: r.url.clone(),
                        scheme: other.to_string(),
                    }),
                }
            }
        }
    }
}

impl ProcessDescriptor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl RemoteDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The bearer token, if one is configured and non-empty.
    pub fn auth_token(&self) -> Option<&str> {
        self.env
            .get(AUTH_TOKEN_ENV)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }
}

impl ServerEntry {
    /// An external (unmanaged) entry with no metadata beyond a description.
    pub fn new(descriptor: ServerDescriptor, description: impl Into<String>) -> Self {
        Self {
            descriptor,
            description: description.into(),
            managed: false,
            created: None,
            path: None,
            language: None,
        }
    }
}

impl From<ProcessDescriptor> for ServerDescriptor {
    fn from(d: ProcessDescriptor) -> Self {
        Self::Process(d)
    }
}

impl From<RemoteDescriptor> for ServerDescriptor {
    fn from(d: RemoteDescriptor) -> Self {
        Self::Remote(d)
    }
}
