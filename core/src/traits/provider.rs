use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// One transcript entry, shaped exactly as the chat-completions endpoint
/// expects it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_tool_request(tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: None,
            tool_calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } | Self::Tool { content, .. } => {
                Some(content)
            }
            Self::Assistant { content, .. } => content.as_deref(),
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Transcript form of an invocation; `arguments` is a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

/// A tool call as surfaced by the stream, arguments already decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub index: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: InvocationFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationFunction {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            index: 0,
            id: id.into(),
            kind: function_kind(),
            function: InvocationFunction {
                name: name.into(),
                arguments,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn arguments(&self) -> &Map<String, Value> {
        &self.function.arguments
    }

    pub fn arguments_json(&self) -> String {
        Value::Object(self.function.arguments.clone()).to_string()
    }

    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            kind: self.kind.clone(),
            function: FunctionCall {
                name: self.function.name.clone(),
                arguments: self.arguments_json(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One decoded SSE event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Choice {
    pub index: u32,
    pub delta: Delta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl Fragment {
    pub fn content(text: impl Into<String>) -> Self {
        Self::with_delta(Delta {
            content: Some(text.into()),
            ..Delta::default()
        })
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::with_delta(Delta {
            reasoning: Some(text.into()),
            ..Delta::default()
        })
    }

    pub fn tool_calls(calls: Vec<ToolInvocation>) -> Self {
        Self::with_delta(Delta {
            tool_calls: calls,
            ..Delta::default()
        })
    }

    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Self::default()
        }
    }

    pub fn with_delta(delta: Delta) -> Self {
        Self {
            id: None,
            choices: vec![Choice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            usage: None,
        }
    }

    pub fn first_delta(&self) -> Option<&Delta> {
        self.choices.first().map(|c| &c.delta)
    }
}

impl Choice {
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason
            .as_deref()
            .or(self.delta.finish_reason.as_deref())
            .filter(|r| !r.is_empty())
    }
}

/// What a delta carries, by the first non-empty field in priority order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeltaKind<'a> {
    Reasoning(&'a str),
    ToolCalls(&'a [ToolInvocation]),
    Content(&'a str),
    Finish(&'a str),
    Empty,
}

impl Delta {
    pub fn kind(&self) -> DeltaKind<'_> {
        if let Some(reasoning) = self.reasoning.as_deref().filter(|r| !r.is_empty()) {
            return DeltaKind::Reasoning(reasoning);
        }
        if !self.tool_calls.is_empty() {
            return DeltaKind::ToolCalls(&self.tool_calls);
        }
        if let Some(content) = self.content.as_deref().filter(|c| !c.is_empty()) {
            return DeltaKind::Content(content);
        }
        if let Some(reason) = self.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            return DeltaKind::Finish(reason);
        }
        DeltaKind::Empty
    }

    pub fn is_empty(&self) -> bool {
        self.role.is_none() && matches!(self.kind(), DeltaKind::Empty)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub tools: &'a [Value],
}

pub type FragmentStream = BoxStream<'static, Fragment>;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Opens a streaming completion. Errors here mean no stream was
    /// created; problems after that point simply end the stream.
    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
        cancel: CancellationToken,
    ) -> anyhow::Result<FragmentStream>;
}
