use crate::tools::extract_string_arg;
use crate::traits::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a given file path relative to the working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The relative path of a file in the working directory."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: &Map<String, Value>) -> anyhow::Result<ToolResult> {
        let path = extract_string_arg(args, "path")?;
        let full_path = ctx.resolve(&path)?;

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => Ok(ToolResult::success_with("file_content", content)),
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to read {}: {}",
                full_path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn reads_relative_to_workspace() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "hello file").unwrap();
        let ctx = ToolContext::new(tmp.path(), CancellationToken::new());
        let args = json!({"path": "notes.txt"}).as_object().cloned().unwrap();

        let result = FileReadTool.execute(&ctx, &args).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.data["file_content"], "hello file");
    }

    #[tokio::test]
    async fn missing_file_is_failed_envelope() {
        let tmp = TempDir::new().unwrap();
        let ctx = ToolContext::new(tmp.path(), CancellationToken::new());
        let args = json!({"path": "nope.txt"}).as_object().cloned().unwrap();

        let result = FileReadTool.execute(&ctx, &args).await.unwrap();
        assert!(!result.is_success());
        assert!(result.data["error"].as_str().unwrap().contains("nope.txt"));
    }

    #[tokio::test]
    async fn refuses_paths_outside_workspace() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "hidden").unwrap();
        let workspace = tmp.path().join("ws");
        std::fs::create_dir(&workspace).unwrap();
        let ctx = ToolContext::new(&workspace, CancellationToken::new());
        let args = json!({"path": "../secret.txt"}).as_object().cloned().unwrap();

        let err = FileReadTool.execute(&ctx, &args).await.unwrap_err();
        assert!(err.to_string().contains("outside the workspace"));
    }

    #[tokio::test]
    async fn missing_path_argument_errors() {
        let ctx = ToolContext::new(".", CancellationToken::new());
        assert!(FileReadTool.execute(&ctx, &Map::new()).await.is_err());
    }
}
