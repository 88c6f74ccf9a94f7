//! OpenAI-compatible LLM integration module
//!
//! This module provides a client for the vLLM OpenAI-compatible server,
//! including tool calling over `/v1/chat/completions`.

pub mod client;
pub mod tool_use;

// Re-export public types so callers can `use crate::llm::ChatMessage`
pub use client::{ChatBackend, ChatClient, ChatError, ChatResponse, SamplingParams, Usage};
pub use tool_use::{parse_tool_calls_from_text, ChatMessage, FunctionCall, Tool, ToolCall, ToolFunction};
