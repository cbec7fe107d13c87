//! Subcommand handlers. Each returns the text to print on success.

use crate::AddArgs;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use forge_config::ForgeConfig;
use forge_mcp::{Method, Proxy};
use forge_registry::{AuditAction, AuditLog, Registry};
use forge_types::{ProcessDescriptor, RemoteDescriptor, ServerDescriptor, ServerEntry};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Parse a `KEY=VALUE` pair.
pub fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn build_entry(args: AddArgs) -> ServerEntry {
    let descriptor: ServerDescriptor = match (args.command, args.url) {
        (Some(command), _) => ProcessDescriptor {
            command,
            args: args.args,
            env: args.env.into_iter().collect(),
        }
        .into(),
        (None, url) => RemoteDescriptor {
            url: url.unwrap_or_default(),
            env: args.env.into_iter().collect(),
        }
        .into(),
    };
    let mut entry = ServerEntry::new(descriptor, args.description);
    entry.managed = args.managed;
    entry.created = Some(Utc::now());
    entry
}

/// Where a server lives, without credentials.
fn target(descriptor: &ServerDescriptor) -> &str {
    match descriptor {
        ServerDescriptor::Process(p) => &p.command,
        ServerDescriptor::Remote(r) => &r.url,
    }
}

async fn audit_or_warn(audit: &AuditLog, action: AuditAction, details: &str) {
    if let Err(e) = audit.record(action, details).await {
        tracing::warn!("Failed to write audit log {}: {e}", audit.path().display());
    }
}

pub async fn add(registry: &Registry, audit: &AuditLog, args: AddArgs) -> Result<String> {
    let alias = args.alias.clone();
    let entry = build_entry(args);
    let details = format!(
        "{alias} transport={} target={}",
        entry.descriptor.transport_name(),
        target(&entry.descriptor)
    );

    let previous = registry
        .add(&alias, entry)
        .await
        .with_context(|| format!("Failed to register '{alias}'"))?;
    audit_or_warn(audit, AuditAction::RegistryAdd, &details).await;

    Ok(match previous {
        Some(_) => format!("Replaced server '{alias}'"),
        None => format!("Added server '{alias}'"),
    })
}

pub async fn list(registry: &Registry) -> Result<String> {
    let entries = registry.list().await.context("Failed to read registry")?;
    if entries.is_empty() {
        return Ok("No servers registered.".to_string());
    }
    let lines: Vec<String> = entries
        .iter()
        .map(|(alias, entry)| {
            format!(
                "{alias} | {} | {} | {}",
                entry.descriptor.transport_name(),
                if entry.managed { "managed" } else { "external" },
                entry.description
            )
            .trim_end_matches([' ', '|'])
            .to_string()
        })
        .collect();
    Ok(lines.join("\n"))
}

pub async fn remove(registry: &Registry, audit: &AuditLog, alias: &str) -> Result<String> {
    let removed = registry
        .remove(alias)
        .await
        .with_context(|| format!("Failed to remove '{alias}'"))?;
    let transport = removed
        .as_ref()
        .map_or("malformed", |entry| entry.descriptor.transport_name());
    audit_or_warn(
        audit,
        AuditAction::RegistryRemove,
        &format!("{alias} transport={transport}"),
    )
    .await;
    Ok(format!("Removed server '{alias}'"))
}

pub async fn status(registry: &Registry, alias: &str) -> Result<String> {
    let entry = registry
        .get(alias)
        .await
        .with_context(|| format!("Failed to look up '{alias}'"))?;
    Ok(render_status(alias, &entry))
}

fn render_status(alias: &str, entry: &ServerEntry) -> String {
    let mut lines = vec![
        format!("alias: {alias}"),
        format!("transport: {}", entry.descriptor.transport_name()),
    ];
    match &entry.descriptor {
        ServerDescriptor::Process(p) => {
            lines.push(format!("command: {}", p.command));
            if !p.args.is_empty() {
                lines.push(format!("args: {}", p.args.join(" ")));
            }
        }
        ServerDescriptor::Remote(r) => lines.push(format!("url: {}", r.url)),
    }
    let env_count = entry.descriptor.env().len();
    lines.push(format!("env: {env_count} variable(s), values hidden"));
    if !entry.description.is_empty() {
        lines.push(format!("description: {}", entry.description));
    }
    lines.push(format!("managed: {}", entry.managed));
    if let Some(created) = entry.created {
        lines.push(format!("created: {}", created.to_rfc3339()));
    }
    if let Some(path) = &entry.path {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(language) = &entry.language {
        lines.push(format!("language: {language}"));
    }
    lines.join("\n")
}

pub async fn discover(
    config: &ForgeConfig,
    registry: Arc<Registry>,
    audit: &AuditLog,
    alias: &str,
) -> Result<String> {
    proxied(config, registry, audit, alias, Method::ListTools, serde_json::json!({})).await
}

pub async fn call(
    config: &ForgeConfig,
    registry: Arc<Registry>,
    audit: &AuditLog,
    alias: &str,
    tool: &str,
    raw_args: &str,
) -> Result<String> {
    let arguments: Value =
        serde_json::from_str(raw_args).context("--args must be valid JSON")?;
    if !arguments.is_object() {
        bail!("--args must be a JSON object");
    }
    let params = serde_json::json!({ "name": tool, "arguments": arguments });
    proxied(config, registry, audit, alias, Method::CallTool, params).await
}

/// Run one proxied call; Ctrl-C cancels it.
async fn proxied(
    config: &ForgeConfig,
    registry: Arc<Registry>,
    audit: &AuditLog,
    alias: &str,
    method: Method,
    params: Value,
) -> Result<String> {
    let proxy = Proxy::new(registry, std::env::vars().collect(), config.timeouts);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupted; cancelling call");
            trigger.cancel();
        }
    });
    let report = proxy
        .invoke_reporting(alias, method, params, &cancel)
        .await;
    ctrl_c.abort();

    let result = report.result;
    if report.transport == Some("remote") {
        let outcome = if result.is_ok() { "ok" } else { "error" };
        audit_or_warn(
            audit,
            AuditAction::RemoteCall,
            &format!("{alias} {method} {outcome}"),
        )
        .await;
    }
    result.with_context(|| format!("{method} on '{alias}' failed"))
}
