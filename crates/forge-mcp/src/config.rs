//! Timeout configuration for proxied calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_handshake_ms() -> u64 {
    10_000
}

fn default_response_ms() -> u64 {
    30_000
}

fn default_remote_ms() -> u64 {
    30_000
}

fn default_grace_ms() -> u64 {
    5_000
}

/// Deadlines applied to every proxied call, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTimeouts {
    /// Bound on the `initialize` exchange with a process server.
    #[serde(default = "default_handshake_ms")]
    pub handshake_ms: u64,
    /// Bound on the actual request to a process server.
    #[serde(default = "default_response_ms")]
    pub response_ms: u64,
    /// End-to-end bound on a remote POST (connect + body).
    #[serde(default = "default_remote_ms")]
    pub remote_ms: u64,
    /// How long a terminated child may take to exit before it is killed.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

impl Default for ProxyTimeouts {
    fn default() -> Self {
        Self {
            handshake_ms: default_handshake_ms(),
            response_ms: default_response_ms(),
            remote_ms: default_remote_ms(),
            grace_ms: default_grace_ms(),
        }
    }
}

impl ProxyTimeouts {
    pub fn handshake(&self) -> Duration {
        Duration::from_millis(self.handshake_ms)
    }

    pub fn response(&self) -> Duration {
        Duration::from_millis(self.response_ms)
    }

    pub fn remote(&self) -> Duration {
        Duration::from_millis(self.remote_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}
