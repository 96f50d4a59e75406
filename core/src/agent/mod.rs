pub mod loop_;
pub mod registry;
pub mod render;
pub mod transcript;
pub mod usage;

pub use loop_::AgentLoop;
pub use registry::ToolRegistry;
pub use render::Renderer;
pub use transcript::Transcript;
pub use usage::UsageTotals;
