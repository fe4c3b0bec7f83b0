use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::bridge::{error_detail, BridgeClient};
use crate::error::{GatewayError, Result};
use crate::tool::{Tool, ToolRegistry, ERROR_MARKER};

/// Upper bound on characters returned by `read_file`.
pub const MAX_READ_CHARS: usize = 8000;

/// Output of `list_files` when the bridge root holds no files.
pub const NO_FILES_SENTINEL: &str = "No files found.";

/// Registry holding `list_files` and `read_file`, both backed by `client`.
pub fn filesystem_toolkit(client: BridgeClient) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(ListFilesTool {
        client: client.clone(),
    })?;
    registry.register(ReadFileTool { client })?;
    Ok(registry)
}

pub struct ListFilesTool {
    client: BridgeClient,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List available files from the sandboxed filesystem bridge. Takes no arguments."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _input: Value) -> Result<String> {
        let files = self
            .client
            .list()
            .await
            .map_err(|err| GatewayError::ToolInvocation {
                name: self.name().into(),
                source: Box::new(err),
            })?;
        Ok(render_listing(&files))
    }
}

pub struct ReadFileTool {
    client: BridgeClient,
}

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    path: String,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file's content from the sandboxed filesystem bridge by relative path (e.g. sample.txt). Expects {\"path\": string}."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the bridge root"}
            },
            "required": ["path"]
        })
    }

    async fn call(&self, input: Value) -> Result<String> {
        let req: ReadFileInput = serde_json::from_value(input).map_err(|err| {
            GatewayError::InvalidArguments {
                name: self.name().into(),
                reason: err.to_string(),
            }
        })?;

        match self.client.read(&req.path).await {
            Ok(resp) => Ok(truncate_chars(&resp.content, MAX_READ_CHARS).to_string()),
            Err(GatewayError::Bridge { status, body }) => {
                debug!(path = %req.path, status, "bridge refused read");
                Ok(format!(
                    "{ERROR_MARKER} reading {}: {}",
                    req.path,
                    error_detail(&body)
                ))
            }
            Err(err) => Err(GatewayError::ToolInvocation {
                name: self.name().into(),
                source: Box::new(err),
            }),
        }
    }
}

pub fn render_listing(files: &[String]) -> String {
    if files.is_empty() {
        NO_FILES_SENTINEL.to_string()
    } else {
        files.join("\n")
    }
}

/// Longest prefix of `text` holding at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_listing_uses_sentinel() {
        assert_eq!(render_listing(&[]), "No files found.");
        assert_eq!(
            render_listing(&["a.txt".to_string(), "b.txt".to_string()]),
            "a.txt\nb.txt"
        );
    }

    #[test]
    fn truncates_on_character_boundaries() {
        let text = "é".repeat(MAX_READ_CHARS + 10);
        let cut = truncate_chars(&text, MAX_READ_CHARS);
        assert_eq!(cut.chars().count(), MAX_READ_CHARS);
        assert_eq!(truncate_chars("short", MAX_READ_CHARS), "short");
    }

    #[test]
    fn registers_both_filesystem_tools() {
        let registry = filesystem_toolkit(BridgeClient::new("http://127.0.0.1:9")).unwrap();
        assert_eq!(registry.names(), vec!["list_files", "read_file"]);
    }

    #[tokio::test]
    async fn unreachable_bridge_becomes_error_output() {
        let registry = filesystem_toolkit(BridgeClient::new("http://127.0.0.1:9")).unwrap();
        let output = registry.invoke("list_files", json!({})).await;
        assert!(output.starts_with(ERROR_MARKER));
    }
}
