//! Server registry persistence and audit logging for mcp-forge.

pub mod audit;
pub mod store;

pub use audit::{AuditAction, AuditLog};
pub use store::{MemoryRegistry, Registry, validate_alias};
