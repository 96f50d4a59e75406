use crate::traits::Tool;
use serde_json::{Map, Value};
use std::sync::Arc;

pub mod file_read;
pub mod list_files;
pub mod weather;

pub use file_read::FileReadTool;
pub use list_files::ListFilesTool;
pub use weather::WeatherTool;

/// The tools registered by default.
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(WeatherTool),
        Arc::new(FileReadTool),
        Arc::new(ListFilesTool),
    ]
}

pub fn extract_string_arg(args: &Map<String, Value>, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' parameter", key))
        .map(|s| s.to_string())
}

pub fn extract_string_arg_opt(args: &Map<String, Value>, key: &str, default: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}
