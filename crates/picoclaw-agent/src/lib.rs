//! The tool-call loop and the `LlmProvider` trait that binds an external
//! language-model endpoint to the skill registry. See spec.md §4.5.

pub mod anthropic;
pub mod openai_compat;
pub mod provider;
pub mod stream;
pub mod tool_loop;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, ToolCall, ToolDefinition};
pub use stream::StreamEvent;
pub use tool_loop::{run_tool_loop, ToolLoopRunner, DEFAULT_MAX_ITERATIONS, DEFAULT_SUBAGENT_MAX_ITERATIONS};
