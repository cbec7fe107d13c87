//! Alias -> server entry storage.

use forge_types::{DescriptorError, EntryFuture, RegistryError, RegistryStore, ServerEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

const REGISTRY_FILE: &str = "registry.json";

/// On-disk layout: `{"servers": {alias: entry}}`.
///
/// Entries stay raw until one is needed, so a single hand-edited entry that
/// does not decode only affects its own alias.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    servers: BTreeMap<String, Value>,
}

fn decode_entry(alias: &str, raw: Value) -> Result<ServerEntry, RegistryError> {
    serde_json::from_value(raw).map_err(|e| RegistryError::InvalidDescriptor {
        alias: alias.to_string(),
        source: DescriptorError::Malformed {
            reason: e.to_string(),
        },
    })
}

/// Registry backed by a single JSON file.
///
/// Every operation re-reads the file, so edits made by another process are
/// picked up on the next call. Writes go through a tmp file and a rename and
/// are serialized within this process.
pub struct Registry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Registry {
    /// Registry stored at `<home>/registry.json`. Nothing is read until first use.
    pub fn open(home: &Path) -> Self {
        Self::at(home.join(REGISTRY_FILE))
    }

    /// Registry stored at an explicit file path.
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up one alias. An entry that does not decode is `InvalidDescriptor`.
    pub async fn get(&self, alias: &str) -> Result<ServerEntry, RegistryError> {
        let mut file = self.load().await?;
        let raw = file
            .servers
            .remove(alias)
            .ok_or_else(|| RegistryError::NotFound {
                alias: alias.to_string(),
            })?;
        decode_entry(alias, raw)
    }

    /// All entries that decode, sorted by alias. Malformed entries are
    /// skipped with a warning.
    pub async fn list(&self) -> Result<Vec<(String, ServerEntry)>, RegistryError> {
        let file = self.load().await?;
        let mut entries = Vec::with_capacity(file.servers.len());
        for (alias, raw) in file.servers {
            match decode_entry(&alias, raw) {
                Ok(entry) => entries.push((alias, entry)),
                Err(e) => tracing::warn!("Skipping registry entry: {e}"),
            }
        }
        Ok(entries)
    }

    /// Register `entry` under `alias`, replacing any existing entry.
    ///
    /// Returns the replaced entry, if any. Nothing is written when the alias
    /// or the descriptor is invalid.
    pub async fn add(
        &self,
        alias: &str,
        entry: ServerEntry,
    ) -> Result<Option<ServerEntry>, RegistryError> {
        validate_alias(alias)?;
        entry
            .descriptor
            .validate()
            .map_err(|source| RegistryError::InvalidDescriptor {
                alias: alias.to_string(),
                source,
            })?;

        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        let previous = file
            .servers
            .insert(alias.to_string(), serde_json::to_value(entry)?)
            .and_then(|raw| decode_entry(alias, raw).ok());
        self.save(&file).await?;

        if previous.is_some() {
            tracing::debug!(alias, "Replaced registry entry");
        } else {
            tracing::debug!(alias, "Added registry entry");
        }
        Ok(previous)
    }

    /// Remove `alias`.
    ///
    /// Returns the removed entry, or `None` if it was malformed. Malformed
    /// entries can always be removed.
    pub async fn remove(&self, alias: &str) -> Result<Option<ServerEntry>, RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        let raw = file
            .servers
            .remove(alias)
            .ok_or_else(|| RegistryError::NotFound {
                alias: alias.to_string(),
            })?;
        self.save(&file).await?;
        tracing::debug!(alias, "Removed registry entry");
        Ok(decode_entry(alias, raw).ok())
    }

    async fn load(&self) -> Result<RegistryFile, RegistryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if data.trim().is_empty() => Ok(RegistryFile::default()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic write: .tmp → rename.
    async fn save(&self, file: &RegistryFile) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(file)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

impl RegistryStore for Registry {
    fn get<'a>(&'a self, alias: &'a str) -> EntryFuture<'a> {
        Box::pin(Registry::get(self, alias))
    }
}

/// Aliases are non-empty and limited to ASCII letters, digits, `-`, `_` and `.`.
pub fn validate_alias(alias: &str) -> Result<(), RegistryError> {
    let reason = if alias.is_empty() {
        Some("alias must not be empty".to_string())
    } else {
        alias
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .map(|c| format!("character {c:?} is not allowed"))
    };
    match reason {
        Some(reason) => Err(RegistryError::InvalidAlias {
            alias: alias.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// In-memory registry.
///
/// Entries are stored as given; descriptors are only checked when a call
/// resolves them.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: RwLock<BTreeMap<String, ServerEntry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, alias: impl Into<String>, entry: ServerEntry) -> Option<ServerEntry> {
        self.entries.write().await.insert(alias.into(), entry)
    }

    pub async fn remove(&self, alias: &str) -> Option<ServerEntry> {
        self.entries.write().await.remove(alias)
    }

    pub async fn list(&self) -> Vec<(String, ServerEntry)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(alias, entry)| (alias.clone(), entry.clone()))
            .collect()
    }
}

impl RegistryStore for MemoryRegistry {
    fn get<'a>(&'a self, alias: &'a str) -> EntryFuture<'a> {
        Box::pin(async move {
            self.entries
                .read()
                .await
                .get(alias)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound {
                    alias: alias.to_string(),
                })
        })
    }
}
