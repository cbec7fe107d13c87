//! Render raw MCP results as caller-facing text.
//!
//! Shared by both transports. Pure functions: the only failure is a result
//! that matches neither the tool-list nor the tool-call shape.

use crate::error::ProxyError;
use crate::jsonrpc::Method;
use serde_json::Value;

/// Output when a server exposes no tools.
pub const NO_TOOLS: &str = "No tools found on this server.";

/// Output when a tool call returns no content.
pub const EMPTY_RESPONSE: &str = "(empty response)";

/// Prefix for results flagged with `isError`.
pub const TOOL_ERROR_PREFIX: &str = "Tool reported an error:";

/// Format `result` according to the method that produced it.
pub fn format_result(method: Method, result: &Value) -> Result<String, ProxyError> {
    match method {
        Method::ListTools => format_tool_list(result),
        Method::CallTool => format_call_result(result),
    }
}

/// One line per tool, one indented line per declared parameter.
///
/// ```text
/// Available tools:
///   search: Search the index
///     query: string - Text to look for (required)
/// ```
pub fn format_tool_list(result: &Value) -> Result<String, ProxyError> {
    let unrecognized = || ProxyError::UnrecognizedResultShape {
        payload: result.clone(),
    };
    let tools = result
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(unrecognized)?;
    if tools.is_empty() {
        return Ok(NO_TOOLS.to_string());
    }

    let mut lines = vec!["Available tools:".to_string()];
    for tool in tools {
        let name = tool
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(unrecognized)?;
        let description = tool
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        lines.push(format!("  {name}: {description}").trim_end().to_string());

        let schema = tool.get("inputSchema");
        let required: Vec<&str> = schema
            .and_then(|s| s.get("required"))
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let Some(properties) = schema
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object)
        else {
            continue;
        };

        for (param, param_schema) in properties {
            let ty = param_type(param_schema);
            let mut line = format!("    {param}: {ty}");
            if let Some(desc) = param_schema
                .get("description")
                .and_then(Value::as_str)
                .filter(|d| !d.is_empty())
            {
                line.push_str(" - ");
                line.push_str(desc);
            }
            if required.contains(&param.as_str()) {
                line.push_str(" (required)");
            }
            lines.push(line);
        }
    }
    Ok(lines.join("\n"))
}

/// A parameter's JSON Schema type; union types are joined with `|`.
fn param_type(schema: &Value) -> String {
    match schema.get("type") {
        Some(Value::String(t)) => t.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("|"),
        _ => "any".to_string(),
    }
}

/// Text items verbatim, anything else as compact JSON, one per line.
pub fn format_call_result(result: &Value) -> Result<String, ProxyError> {
    let content = result
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ProxyError::UnrecognizedResultShape {
            payload: result.clone(),
        })?;

    let parts: Vec<String> = content
        .iter()
        .map(|item| match (item.get("type").and_then(Value::as_str), item.get("text")) {
            (Some("text"), Some(Value::String(text))) => text.clone(),
            _ => item.to_string(),
        })
        .collect();

    let body = if parts.is_empty() {
        EMPTY_RESPONSE.to_string()
    } else {
        parts.join("\n")
    };

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        Ok(format!("{TOOL_ERROR_PREFIX}\n{body}"))
    } else {
        Ok(body)
    }
}
