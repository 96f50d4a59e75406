pub mod agent;
pub mod config;
pub mod error;
pub mod providers;
pub mod tools;
pub mod traits;

pub use agent::{AgentLoop, Renderer, ToolRegistry, Transcript, UsageTotals};
pub use config::*;
pub use error::AgentError;
pub use providers::*;
pub use tools::*;
pub use traits::*;
