use crate::traits::{ChatMessage, Tool, ToolContext, ToolInvocation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool; a tool already registered under the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced existing tool registration");
        }
    }

    pub fn register_all(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn definitions(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the named tool and appends its result record to `results`.
    /// Unknown names are skipped and `false` is returned.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        invocation: &ToolInvocation,
        results: &mut Vec<ChatMessage>,
    ) -> bool {
        let Some(tool) = self.tools.get(invocation.name()) else {
            tracing::warn!(tool = %invocation.name(), id = %invocation.id, "Skipping unknown tool");
            return false;
        };

        results.push(tool.call(ctx, invocation).await);
        true
    }
}
