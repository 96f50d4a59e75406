pub mod provider;
pub mod tool;

pub use provider::{
    ChatMessage, ChatRequest, Choice, Delta, DeltaKind, Fragment, FragmentStream, FunctionCall,
    InvocationFunction, Provider, ToolCall, ToolInvocation, Usage,
};
pub use tool::{Tool, ToolContext, ToolResult, ToolStatus};
