use crate::tools::extract_string_arg_opt;
use crate::traits::{Tool, ToolContext, ToolResult};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;
use walkdir::WalkDir;

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_file"
    }

    fn description(&self) -> &str {
        "List files and directories at a given path. If no path is provided, lists files in the current directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The relative path of a directory in the working directory."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: &Map<String, Value>) -> anyhow::Result<ToolResult> {
        let root = ctx.resolve(&extract_string_arg_opt(args, "path", "."))?;

        let walked = tokio::task::spawn_blocking(move || walk(&root))
            .await
            .context("directory walk panicked")?;

        match walked {
            Ok(files) => Ok(ToolResult::success_with("files", files)),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

/// Every entry below `root`, relative to it, directories suffixed with `/`.
fn walk(root: &Path) -> Result<Vec<String>, walkdir::Error> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            files.push(format!("{}/", rel));
        } else {
            files.push(rel);
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn lists_recursively_with_dir_suffix() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/main.rs"), "").unwrap();
        std::fs::write(tmp.path().join("README.md"), "").unwrap();
        let ctx = ToolContext::new(tmp.path(), CancellationToken::new());

        let result = ListFilesTool.execute(&ctx, &Map::new()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.data["files"], json!(["README.md", "src/", "src/main.rs"]));
    }

    #[tokio::test]
    async fn missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let ctx = ToolContext::new(tmp.path(), CancellationToken::new());
        let args = json!({"path": "absent"}).as_object().cloned().unwrap();

        let result = ListFilesTool.execute(&ctx, &args).await.unwrap();
        assert_eq!(result.status, crate::traits::ToolStatus::Failed);
    }

    #[tokio::test]
    async fn absolute_path_is_refused() {
        let tmp = TempDir::new().unwrap();
        let ctx = ToolContext::new(tmp.path(), CancellationToken::new());
        let args = json!({"path": "/"}).as_object().cloned().unwrap();

        assert!(ListFilesTool.execute(&ctx, &args).await.is_err());
    }
}
