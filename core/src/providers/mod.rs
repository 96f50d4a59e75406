pub mod factory;
pub mod mock;
pub mod openai;
pub mod sse;

pub use factory::create_provider;
pub use mock::{MockProvider, MockReply};
pub use openai::OpenAIProvider;
pub use sse::{SseDecoder, ToolCallAssembler};
