//! Shared types and error hierarchy for mcp-forge.

pub mod descriptor;
pub mod error;
pub mod registry;

pub use descriptor::{ProcessDescriptor, RemoteDescriptor, ServerDescriptor, ServerEntry};
pub use error::{ConfigError, DescriptorError, RegistryError};
pub use registry::{EntryFuture, RegistryStore};
