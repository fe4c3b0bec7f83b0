//! A minimal agentic chat gateway.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an OpenAI-compatible client.
//! - A fixed tool registry (`ToolRegistry`) holding `list_files` and `read_file`,
//!   both backed by a path-sandboxed filesystem bridge.
//! - An `AgentLoop` that alternates between consulting the model and executing the
//!   tools it requests until a final answer is produced.
//! - A `Gateway` that loads a conversation, runs one turn and commits the result,
//!   plus the HTTP surfaces for the gateway and the bridge (`server` feature).

mod agent;
pub mod bridge;
mod config;
mod error;
mod executor;
mod gateway;
mod llm;
mod message;
mod retry;
#[cfg(feature = "server")]
pub mod server;
mod store;
pub mod telemetry;
mod tool;
mod toolkit;

pub use agent::{AgentLoop, AgentState, LoopOutcome, SYSTEM_INSTRUCTION};
pub use bridge::BridgeClient;
#[cfg(feature = "server")]
pub use bridge::FsBridge;
pub use config::{
    AgentConfig, BridgeClientConfig, FsBridgeConfig, GatewayConfig, ModelConfig, ServerConfig,
};
pub use error::{GatewayError, Result};
pub use executor::TurnExecutor;
pub use gateway::{ChatOutcome, Gateway, NO_REPLY_SENTINEL};
pub use llm::{LanguageModel, ModelCompletion, OpenAIClient, StubModel, StubReply};
pub use message::{Message, Role, ToolCall, ToolOutcome, ToolResult};
pub use retry::RetryPolicy;
pub use store::{
    ConversationLocks, ConversationStore, FileConversationStore, InMemoryConversationStore,
};
pub use tool::{Tool, ToolDescription, ToolRegistry, ERROR_MARKER};
pub use toolkit::{filesystem_toolkit, MAX_READ_CHARS, NO_FILES_SENTINEL};
