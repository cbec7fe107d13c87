//! Error hierarchy shared by the registry and the proxy.

use thiserror::Error;

/// A server descriptor that violates its transport's invariants.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("process transport requires a non-empty command")]
    EmptyCommand,

    #[error("remote transport requires a non-empty url")]
    EmptyUrl,

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme '{scheme}' in '{url}' (expected http or https)")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("malformed entry: {reason}")]
    Malformed { reason: String },
}

/// Errors from registry store operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Server '{alias}' not found in registry")]
    NotFound { alias: String },

    #[error("Invalid alias '{alias}': {reason}")]
    InvalidAlias { alias: String, reason: String },

    #[error("Invalid descriptor for '{alias}': {source}")]
    InvalidDescriptor {
        alias: String,
        #[source]
        source: DescriptorError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry parse error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
