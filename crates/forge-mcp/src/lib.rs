//! MCP proxy for mcp-forge.
//!
//! Reaches any registered MCP server through one entry point. Process-backed
//! servers are spawned per call, initialized with a handshake, asked exactly
//! one question over newline-delimited JSON-RPC, and torn down. Remote servers
//! receive the same envelope in a single HTTP POST. Results are rendered to
//! caller-facing text by a formatter shared by both paths.

mod child;
pub mod config;
pub mod error;
pub mod format;
pub mod jsonrpc;
pub mod process;
pub mod proxy;
pub mod remote;

pub use config::ProxyTimeouts;
pub use error::{FrameError, ProxyError};
pub use jsonrpc::Method;
pub use process::ProcessTransport;
pub use proxy::{CallReport, Proxy};
pub use remote::RemoteTransport;
