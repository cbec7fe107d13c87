//! Append-only audit trail of registry changes and remote calls.
//!
//! One line per event: `<RFC3339 UTC> | <action> | <details>`. Callers pass
//! details themselves; environment values must never be part of them.

use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const AUDIT_FILE: &str = "audit.log";

/// Kinds of audited events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    RegistryAdd,
    RegistryRemove,
    RemoteCall,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegistryAdd => "registry_add",
            Self::RegistryRemove => "registry_remove",
            Self::RemoteCall => "remote_call",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit log file at `<home>/audit.log`.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn open(home: &Path) -> Self {
        Self {
            path: home.join(AUDIT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event line, creating the file and its directory as needed.
    pub async fn record(&self, action: AuditAction, details: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = format_line(action, details);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

fn format_line(action: AuditAction, details: &str) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    // Keep one event per line.
    let details = details.replace(['\r', '\n'], " ");
    format!("{timestamp} | {action} | {details}\n")
}
