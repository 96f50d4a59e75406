use crate::traits::{ChatMessage, ToolInvocation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use anyhow::bail;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolStatus {
    Success,
    Failed,
}

/// The envelope a tool hands back to the model, JSON-encoded as the
/// `content` of a tool-result message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub data: Map<String, Value>,
}

impl ToolResult {
    pub fn success(data: Map<String, Value>) -> Self {
        Self {
            status: ToolStatus::Success,
            data,
        }
    }

    pub fn success_with(key: &str, value: impl Into<Value>) -> Self {
        let mut data = Map::new();
        data.insert(key.to_string(), value.into());
        Self::success(data)
    }

    pub fn error(error: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("error".to_string(), Value::String(error.into()));
        Self {
            status: ToolStatus::Failed,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"FAILED","data":{"error":"error marshaling tool response"}}"#.to_string()
        })
    }
}

/// Per-call environment handed to a tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workspace: PathBuf,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(workspace: impl AsRef<Path>, cancel: CancellationToken) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            cancel,
        }
    }

    /// Joins `path` onto the workspace. Absolute paths and `..` steps that
    /// climb above the workspace are rejected. Symlinks are not resolved.
    pub fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let mut relative = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !relative.pop() {
                        bail!("Path '{}' is outside the workspace", path);
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    bail!("Path '{}' must be relative to the workspace", path);
                }
            }
        }
        Ok(self.workspace.join(relative))
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    async fn execute(&self, ctx: &ToolContext, args: &Map<String, Value>)
    -> anyhow::Result<ToolResult>;

    fn definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters_schema(),
            }
        })
    }

    /// Runs the tool and wraps the outcome as a tool-result message.
    /// Execution errors become a `FAILED` envelope; this never fails.
    async fn call(&self, ctx: &ToolContext, invocation: &ToolInvocation) -> ChatMessage {
        let result = match self.execute(ctx, invocation.arguments()).await {
            Ok(result) => result,
            Err(e) => ToolResult::error(format!("{:#}", e)),
        };
        ChatMessage::tool_result(invocation.id.clone(), result.to_content())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_encodes_status_in_caps() {
        let ok = ToolResult::success_with("files", json!(["a"]));
        assert_eq!(
            serde_json::from_str::<Value>(&ok.to_content()).unwrap(),
            json!({"status": "SUCCESS", "data": {"files": ["a"]}})
        );

        let failed = ToolResult::error("boom");
        assert!(!failed.is_success());
        assert_eq!(
            serde_json::from_str::<Value>(&failed.to_content()).unwrap(),
            json!({"status": "FAILED", "data": {"error": "boom"}})
        );
    }

    #[test]
    fn resolve_stays_inside_workspace() {
        let ctx = ToolContext::new("/work", CancellationToken::new());

        assert_eq!(ctx.resolve("a/./b.txt").unwrap(), PathBuf::from("/work/a/b.txt"));
        assert_eq!(ctx.resolve("a/../b.txt").unwrap(), PathBuf::from("/work/b.txt"));
        assert_eq!(ctx.resolve(".").unwrap(), PathBuf::from("/work"));
        assert!(ctx.resolve("../secret").is_err());
        assert!(ctx.resolve("a/../../secret").is_err());
        assert!(ctx.resolve("/etc/passwd").is_err());
    }
}
