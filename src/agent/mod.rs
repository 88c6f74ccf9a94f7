//! Agent module for tool-assisted question answering
//!
//! # Architecture
//!
//! ```text
//! Question → AgentController → /v1/chat/completions (with tools)
//!                  ↓
//!           Tool calls (native, or recovered from text)
//!                  ↓
//!           ToolRegistry.dispatch() → cBioPortal / bioRxiv
//!                  ↓
//!           Tool messages fed back → Loop or Complete
//! ```

pub mod controller;

pub use controller::{
    AgentConfig, AgentController, AgentError, AgentResult, ToolCallRecord, DEFAULT_SYSTEM_PROMPT,
};
