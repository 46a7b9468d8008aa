//! Agent Runtime - tool-calling shopping assistant
//!
//! This crate is the conversational half of shopkeep. It:
//! - Keeps the conversation history and running cost for one shopper
//! - Sends the history plus the tool catalog to the language model
//! - Executes the store tools the model asks for and feeds results back
//! - Emits telemetry spans for every agent turn, model request and tool call
//!
//! # Architecture
//!
//! Each `chat` turn runs a bounded loop:
//! 1. **Model Request** (`gateway`) - full history + tool registry to the chat backend
//! 2. **Tool Dispatch** (`executor`) - requested tools run against the store, in order
//! 3. **Repeat** until the model answers with plain text, or `MAX_ITERATIONS` is hit
//!
//! # Key Types
//!
//! - `AgentRuntime` - owns the conversation and drives the loop (see `runtime`)
//! - `ChatBackend` - pluggable model transport; `OllamaBackend` is the default
//! - `ToolRegistry` - the fixed set of store tools offered to the model
//! - `Telemetry` - span collaborator passed explicitly to every component
//!
//! # Failure Policy
//!
//! Model failures and requests for unregistered tools end the turn with an
//! error. Any other tool failure becomes a failed tool result that the model
//! sees on its next request.

pub mod conversation;
pub mod cost;
pub mod executor;
pub mod gateway;
pub mod llm;
pub mod runtime;
pub mod telemetry;
pub mod tools;

#[cfg(test)]
mod testing;

pub use conversation::{Conversation, Message, Role, ToolArguments, ToolCallRequest};
pub use cost::CostEstimator;
pub use executor::{ToolError, ToolExecutor};
pub use gateway::{GatewayError, ModelExchange, ModelGateway, ModelReply, Usage};
pub use llm::{BackendError, ChatBackend, ChatRequest, ChatResponse, OllamaBackend};
pub use runtime::{AgentError, AgentRuntime, AgentSettings, TurnSummary, MAX_ITERATIONS};
pub use telemetry::{MemorySink, Operation, SpanSink, SpanStatus, Telemetry, TracingSink};
pub use tools::{ToolDescriptor, ToolName, ToolRegistry};
